use crate::adapters::ItemStore;
use crate::errors::{AppError, AppResult};
use crate::models::{Notice, NoticeSender};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// One view's item collection, mutated optimistically: local state changes
// first, the remote request follows, and the outcome either confirms the
// change or rolls it back. Failures produce one error notice and stay local
// to the item; the view keeps rendering.
pub struct Collection<S: ItemStore> {
    store: Arc<S>,
    list_id: String,
    items: Arc<Mutex<Vec<S::Item>>>,
    busy: Arc<Mutex<HashSet<String>>>,
    cancelled: Arc<AtomicBool>,
    notices: NoticeSender,
}

impl<S: ItemStore> Clone for Collection<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            list_id: self.list_id.clone(),
            items: self.items.clone(),
            busy: self.busy.clone(),
            cancelled: self.cancelled.clone(),
            notices: self.notices.clone(),
        }
    }
}

impl<S: ItemStore> Collection<S> {
    pub fn new(store: S, list_id: &str, notices: NoticeSender) -> Self {
        Self {
            store: Arc::new(store),
            list_id: list_id.to_string(),
            items: Arc::new(Mutex::new(Vec::new())),
            busy: Arc::new(Mutex::new(HashSet::new())),
            cancelled: Arc::new(AtomicBool::new(false)),
            notices,
        }
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    pub fn snapshot(&self) -> Vec<S::Item> {
        self.lock_items().clone()
    }

    pub fn is_busy(&self, id: &str) -> bool {
        self.lock_busy().contains(id)
    }

    // Marks the view as torn down; responses that arrive afterwards are
    // discarded instead of mutating state nobody renders.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub async fn refresh(&self) -> AppResult<()> {
        match self.store.list(&self.list_id).await {
            Ok(items) => {
                if !self.cancelled() {
                    *self.lock_items() = items;
                }
                Ok(())
            }
            Err(err) => {
                let _ = self.notices.send(Notice::error("Failed to load items"));
                if !self.cancelled() {
                    self.lock_items().clear();
                }
                Err(err)
            }
        }
    }

    // Inserts a provisional row under a temporary id, then swaps in the
    // real record (matched by that id) once the backend confirms. On
    // failure the provisional row is removed again.
    pub async fn create(&self, draft: S::Draft) -> AppResult<S::Item> {
        let temp_id = format!("temp-{}", Uuid::new_v4());
        let provisional = self.store.provisional(&self.list_id, &temp_id, &draft);
        self.lock_items().push(provisional);
        self.mark_busy(&temp_id);

        let result = self.store.create(&self.list_id, draft).await;
        self.clear_busy(&temp_id);

        match result {
            Ok(created) => {
                if !self.cancelled() {
                    let mut items = self.lock_items();
                    if let Some(slot) = items.iter_mut().find(|i| S::id_of(i) == temp_id) {
                        *slot = created.clone();
                    }
                }
                Ok(created)
            }
            Err(err) => {
                if !self.cancelled() {
                    self.lock_items().retain(|i| S::id_of(i) != temp_id);
                }
                let _ = self.notices.send(Notice::error("Failed to add item"));
                Err(err)
            }
        }
    }

    // Applies the patch locally, then issues the remote update. The item's
    // state is captured at the moment the request is issued; a failure
    // restores exactly that state, however many mutations on other items
    // completed in between.
    pub async fn update(&self, id: &str, patch: S::Patch) -> AppResult<()> {
        let prior = {
            let mut items = self.lock_items();
            let Some(item) = items.iter_mut().find(|i| S::id_of(i) == id) else {
                return Err(AppError::NotFound(format!("item {}", id)));
            };
            let prior = item.clone();
            S::apply_patch(item, &patch);
            prior
        };
        self.mark_busy(id);

        let result = self.store.update(id, patch).await;
        self.clear_busy(id);

        if self.cancelled() {
            return result.map(drop);
        }

        match result {
            Ok(confirmed) => {
                let mut items = self.lock_items();
                if let Some(item) = items.iter_mut().find(|i| S::id_of(i) == id) {
                    *item = confirmed;
                }
                Ok(())
            }
            Err(err) => {
                {
                    let mut items = self.lock_items();
                    if let Some(item) = items.iter_mut().find(|i| S::id_of(i) == id) {
                        *item = prior;
                    }
                }
                let _ = self.notices.send(Notice::error("Failed to update item"));
                Err(err)
            }
        }
    }

    // Removes the item immediately, retaining a copy. A failed delete puts
    // the copy back and re-fetches the whole collection, since optimistic
    // removal can drift out of order against concurrent inserts.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let (index, retained) = {
            let mut items = self.lock_items();
            let Some(index) = items.iter().position(|i| S::id_of(i) == id) else {
                return Err(AppError::NotFound(format!("item {}", id)));
            };
            (index, items.remove(index))
        };
        self.mark_busy(id);

        let result = self.store.delete(id).await;
        self.clear_busy(id);

        if self.cancelled() {
            return result;
        }

        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                {
                    let mut items = self.lock_items();
                    let index = index.min(items.len());
                    items.insert(index, retained);
                }
                let _ = self.notices.send(Notice::error("Failed to delete item"));
                if let Ok(fresh) = self.store.list(&self.list_id).await {
                    if !self.cancelled() {
                        *self.lock_items() = fresh;
                    }
                }
                Err(err)
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn mark_busy(&self, id: &str) {
        self.lock_busy().insert(id.to_string());
    }

    fn clear_busy(&self, id: &str) {
        self.lock_busy().remove(id);
    }

    fn lock_items(&self) -> std::sync::MutexGuard<'_, Vec<S::Item>> {
        self.items.lock().expect("collection items mutex")
    }

    fn lock_busy(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.busy.lock().expect("collection busy mutex")
    }
}
