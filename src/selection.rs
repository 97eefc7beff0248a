use crate::db::Storage;
use crate::models::ListEntry;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct SelectionState {
    user_id: Option<String>,
    active: Option<String>,
}

// Owns the single "active list" value. The in-memory value and the durable
// per-user row move together; restoration and reconciliation are strictly
// keyed by user id so a sign-out/sign-in never leaks the previous user's
// selection.
#[derive(Clone)]
pub struct SelectionManager {
    storage: Arc<Storage>,
    state: Arc<Mutex<SelectionState>>,
}

impl SelectionManager {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            state: Arc::new(Mutex::new(SelectionState::default())),
        }
    }

    // Binds the manager to a user and applies the remembered id before the
    // directory has loaded, so the first render doesn't default to an
    // arbitrary list. The id is validated once the directory resolves.
    pub fn restore(&self, user_id: &str) {
        let remembered = match self.storage.last_selection(user_id) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(user_id, error = %err, "failed to read remembered selection");
                None
            }
        };
        let mut state = self.lock();
        state.user_id = Some(user_id.to_string());
        state.active = remembered;
    }

    pub fn active(&self) -> Option<String> {
        self.lock().active.clone()
    }

    // Updates memory and durable storage synchronously; no network round
    // trip. `None` clears both.
    pub fn select(&self, list_id: Option<&str>) {
        let user_id = {
            let mut state = self.lock();
            state.active = list_id.map(str::to_string);
            state.user_id.clone()
        };
        let Some(user_id) = user_id else {
            return;
        };
        if let Err(err) = self.storage.set_last_selection(&user_id, list_id) {
            // Storage trouble must not break selection; the in-memory value
            // already moved.
            tracing::warn!(user_id, error = %err, "failed to persist selection");
        }
    }

    // Revalidates the active id against a freshly loaded directory: keep it
    // if it still resolves, otherwise fall back to the remembered id, then
    // the first entry, then nothing. Stale remembered ids are purged as a
    // side effect of the rewrite.
    pub fn reconcile(&self, user_id: &str, entries: &[ListEntry]) {
        let active = {
            let state = self.lock();
            if state.user_id.as_deref() != Some(user_id) {
                // A refresh finished for a user who is no longer signed in.
                return;
            }
            state.active.clone()
        };

        if let Some(active) = &active {
            if entries.iter().any(|e| e.id() == active) {
                return;
            }
        }

        let remembered = self
            .storage
            .last_selection(user_id)
            .ok()
            .flatten()
            .filter(|id| entries.iter().any(|e| e.id() == id));
        let next = remembered.or_else(|| entries.first().map(|e| e.id().to_string()));
        self.select(next.as_deref());
    }

    // Drops all in-memory state. Durable rows stay, keyed by user, for the
    // next sign-in.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.user_id = None;
        state.active = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SelectionState> {
        self.state.lock().expect("selection mutex")
    }
}
