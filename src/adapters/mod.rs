pub mod groceries;
pub mod notes;
pub mod tasks;

use crate::errors::AppResult;
use async_trait::async_trait;

// One adapter per item kind. The optimistic collection drives mutations
// through this interface and never sees the concrete kind; each adapter
// canonicalizes identifiers before they cross the backend boundary.
#[async_trait]
pub trait ItemStore: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;
    type Draft: Send + 'static;
    type Patch: Clone + Send + 'static;

    fn id_of(item: &Self::Item) -> &str;
    // Local placeholder inserted while the remote insert is in flight.
    fn provisional(&self, list_id: &str, temp_id: &str, draft: &Self::Draft) -> Self::Item;
    // Applies a patch to the in-memory copy, mirroring what the backend
    // will do to the row.
    fn apply_patch(item: &mut Self::Item, patch: &Self::Patch);

    async fn list(&self, list_id: &str) -> AppResult<Vec<Self::Item>>;
    async fn create(&self, list_id: &str, draft: Self::Draft) -> AppResult<Self::Item>;
    async fn update(&self, id: &str, patch: Self::Patch) -> AppResult<Self::Item>;
    async fn delete(&self, id: &str) -> AppResult<()>;
}

pub(crate) fn canonical(id: &str) -> &str {
    id.trim()
}
