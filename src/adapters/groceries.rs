use crate::adapters::{canonical, ItemStore};
use crate::backend::Backend;
use crate::errors::AppResult;
use crate::models::{GroceryDraft, GroceryEntry, GroceryPatch};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct GroceriesAdapter {
    backend: Arc<dyn Backend>,
}

impl GroceriesAdapter {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ItemStore for GroceriesAdapter {
    type Item = GroceryEntry;
    type Draft = GroceryDraft;
    type Patch = GroceryPatch;

    fn id_of(item: &GroceryEntry) -> &str {
        &item.id
    }

    fn provisional(&self, list_id: &str, temp_id: &str, draft: &GroceryDraft) -> GroceryEntry {
        GroceryEntry {
            id: temp_id.to_string(),
            list_id: canonical(list_id).to_string(),
            name: draft.name.trim().to_string(),
            quantity: draft.quantity.clone().filter(|q| !q.is_empty()),
            checked: false,
            created_at: Utc::now(),
        }
    }

    fn apply_patch(item: &mut GroceryEntry, patch: &GroceryPatch) {
        if let Some(name) = &patch.name {
            item.name = name.trim().to_string();
        }
        if let Some(quantity) = &patch.quantity {
            item.quantity = Some(quantity.clone()).filter(|q| !q.is_empty());
        }
        if let Some(checked) = patch.checked {
            item.checked = checked;
        }
    }

    async fn list(&self, list_id: &str) -> AppResult<Vec<GroceryEntry>> {
        self.backend.list_groceries(canonical(list_id)).await
    }

    async fn create(&self, list_id: &str, draft: GroceryDraft) -> AppResult<GroceryEntry> {
        self.backend.insert_grocery(canonical(list_id), draft).await
    }

    async fn update(&self, id: &str, patch: GroceryPatch) -> AppResult<GroceryEntry> {
        self.backend.update_grocery(canonical(id), patch).await
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.backend.delete_grocery(canonical(id)).await
    }
}
