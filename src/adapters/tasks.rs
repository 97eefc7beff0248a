use crate::adapters::{canonical, ItemStore};
use crate::backend::Backend;
use crate::errors::AppResult;
use crate::models::{TaskDraft, TaskItem, TaskPatch};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct TasksAdapter {
    backend: Arc<dyn Backend>,
}

impl TasksAdapter {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ItemStore for TasksAdapter {
    type Item = TaskItem;
    type Draft = TaskDraft;
    type Patch = TaskPatch;

    fn id_of(item: &TaskItem) -> &str {
        &item.id
    }

    fn provisional(&self, list_id: &str, temp_id: &str, draft: &TaskDraft) -> TaskItem {
        TaskItem {
            id: temp_id.to_string(),
            list_id: canonical(list_id).to_string(),
            title: draft.title.trim().to_string(),
            description: draft
                .description
                .as_deref()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            priority: draft.priority,
            due_date: draft.due_date,
            completed: false,
            created_at: Utc::now(),
        }
    }

    fn apply_patch(item: &mut TaskItem, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            item.title = title.trim().to_string();
        }
        if let Some(description) = &patch.description {
            item.description = Some(description.trim().to_string()).filter(|d| !d.is_empty());
        }
        if let Some(priority) = patch.priority {
            item.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            item.due_date = Some(due_date);
        }
        if let Some(completed) = patch.completed {
            item.completed = completed;
        }
    }

    async fn list(&self, list_id: &str) -> AppResult<Vec<TaskItem>> {
        self.backend.list_tasks(canonical(list_id)).await
    }

    async fn create(&self, list_id: &str, draft: TaskDraft) -> AppResult<TaskItem> {
        self.backend.insert_task(canonical(list_id), draft).await
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> AppResult<TaskItem> {
        self.backend.update_task(canonical(id), patch).await
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.backend.delete_task(canonical(id)).await
    }
}
