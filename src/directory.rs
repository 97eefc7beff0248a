use crate::backend::Backend;
use crate::errors::AppResult;
use crate::models::{ListEntry, UserProfile};
use crate::selection::SelectionManager;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct DirectoryState {
    user_id: Option<String>,
    entries: Vec<ListEntry>,
    loaded_for: Option<String>,
    last_refresh_started: Option<Instant>,
}

// Client-local view of which lists the user belongs to. Refreshes race:
// mounts, cascades and membership changes can all trigger one, so each
// refresh is stamped at initiation and only the newest-started stamp may
// commit its response. Failures clear the directory rather than leaving a
// partially stale list visible.
#[derive(Clone)]
pub struct DirectoryService {
    backend: Arc<dyn Backend>,
    selection: SelectionManager,
    state: Arc<Mutex<DirectoryState>>,
    generation: Arc<AtomicU64>,
    cooldown: Duration,
}

impl DirectoryService {
    pub fn new(backend: Arc<dyn Backend>, selection: SelectionManager, cooldown: Duration) -> Self {
        Self {
            backend,
            selection,
            state: Arc::new(Mutex::new(DirectoryState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            cooldown,
        }
    }

    pub fn entries(&self) -> Vec<ListEntry> {
        self.lock().entries.clone()
    }

    pub fn find(&self, list_id: &str) -> Option<ListEntry> {
        self.lock().entries.iter().find(|e| e.id() == list_id).cloned()
    }

    // Mount-path refresh: re-entrant mount events (double invocation,
    // navigation bounces) collapse into one logical refresh per cooldown
    // window, and a directory already loaded for this user is returned
    // as-is.
    pub async fn ensure_fresh(&self, user_id: &str) -> Vec<ListEntry> {
        {
            let state = self.lock();
            if state.loaded_for.as_deref() == Some(user_id) {
                return state.entries.clone();
            }
            if let (Some(started), Some(current)) =
                (state.last_refresh_started, state.user_id.as_deref())
            {
                if current == user_id && started.elapsed() < self.cooldown {
                    return state.entries.clone();
                }
            }
        }
        self.refresh(user_id).await
    }

    // Loads every membership for the user, joins the lists and enriches
    // each with the owner's display identity in one batched profile lookup.
    // Returns `[]` and reports on failure; never an error to the caller.
    pub async fn refresh(&self, user_id: &str) -> Vec<ListEntry> {
        let stamp = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.lock();
            state.user_id = Some(user_id.to_string());
            state.last_refresh_started = Some(Instant::now());
        }

        match self.load(user_id).await {
            Ok(entries) => {
                {
                    let mut state = self.lock();
                    if self.generation.load(Ordering::SeqCst) != stamp {
                        // A newer refresh started while this one was in
                        // flight; its response owns the directory now.
                        return entries;
                    }
                    if state.user_id.as_deref() != Some(user_id) {
                        return entries;
                    }
                    state.entries = entries.clone();
                    state.loaded_for = Some(user_id.to_string());
                }
                self.selection.reconcile(user_id, &entries);
                entries
            }
            Err(err) => {
                tracing::error!(user_id, error = %err, "failed to load list directory");
                let mut state = self.lock();
                if self.generation.load(Ordering::SeqCst) == stamp {
                    state.entries.clear();
                    state.loaded_for = None;
                }
                Vec::new()
            }
        }
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        *state = DirectoryState::default();
    }

    async fn load(&self, user_id: &str) -> AppResult<Vec<ListEntry>> {
        let mut rows = self.backend.memberships_for(user_id).await?;
        rows.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at));

        let mut owner_ids: Vec<String> = Vec::new();
        for (_, list) in &rows {
            if !owner_ids.contains(&list.created_by) {
                owner_ids.push(list.created_by.clone());
            }
        }

        // Missing owner profiles degrade the labels, not the directory.
        let owners: HashMap<String, UserProfile> = if owner_ids.is_empty() {
            HashMap::new()
        } else {
            match self.backend.profiles_by_ids(&owner_ids).await {
                Ok(profiles) => profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
                Err(err) => {
                    tracing::warn!(user_id, error = %err, "owner profile lookup failed");
                    HashMap::new()
                }
            }
        };

        Ok(rows
            .into_iter()
            .map(|(role, list)| {
                let owner = owners.get(&list.created_by);
                ListEntry {
                    role,
                    owner_first_name: owner.and_then(|o| o.first_name.clone()),
                    owner_last_name: owner.and_then(|o| o.last_name.clone()),
                    owner_username: owner.and_then(|o| o.username.clone()),
                    list,
                }
            })
            .collect())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state.lock().expect("directory mutex")
    }
}
