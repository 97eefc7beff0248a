use crate::adapters::{canonical, ItemStore};
use crate::backend::Backend;
use crate::errors::{AppError, AppResult};
use crate::models::{Note, NoteDraft, Notice, NoticeSender};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct NotesAdapter {
    backend: Arc<dyn Backend>,
    user_id: String,
}

impl NotesAdapter {
    pub fn new(backend: Arc<dyn Backend>, user_id: &str) -> Self {
        Self {
            backend,
            user_id: user_id.to_string(),
        }
    }
}

#[async_trait]
impl ItemStore for NotesAdapter {
    type Item = Note;
    type Draft = NoteDraft;
    type Patch = String;

    fn id_of(item: &Note) -> &str {
        &item.id
    }

    fn provisional(&self, list_id: &str, temp_id: &str, draft: &NoteDraft) -> Note {
        Note {
            id: temp_id.to_string(),
            list_id: canonical(list_id).to_string(),
            body: draft.body.clone(),
            updated_by: Some(self.user_id.clone()),
            updated_at: Utc::now(),
        }
    }

    fn apply_patch(item: &mut Note, patch: &String) {
        item.body = patch.clone();
    }

    async fn list(&self, list_id: &str) -> AppResult<Vec<Note>> {
        let note = self.backend.note_for_list(canonical(list_id)).await?;
        Ok(note.into_iter().collect())
    }

    async fn create(&self, list_id: &str, draft: NoteDraft) -> AppResult<Note> {
        self.backend
            .insert_note(canonical(list_id), draft, &self.user_id)
            .await
    }

    async fn update(&self, id: &str, patch: String) -> AppResult<Note> {
        self.backend
            .update_note(canonical(id), &patch, &self.user_id)
            .await
    }

    async fn delete(&self, _id: &str) -> AppResult<()> {
        // Note rows only go away with their list.
        Err(AppError::Invariant(
            "note rows are deleted with their list".to_string(),
        ))
    }
}

#[derive(Default)]
struct PadState {
    note: Option<Note>,
    body: String,
    last_saved_at: Option<DateTime<Utc>>,
}

// Single-row editor for lists of kind `note`. Edits accumulate locally and
// autosave after a debounce window; a newer edit supersedes an in-flight
// timer via the generation counter.
#[derive(Clone)]
pub struct NotePad {
    backend: Arc<dyn Backend>,
    list_id: String,
    user_id: String,
    debounce: Duration,
    state: Arc<Mutex<PadState>>,
    generation: Arc<AtomicU64>,
    saving: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    save_lock: Arc<tokio::sync::Mutex<()>>,
    notices: NoticeSender,
}

impl NotePad {
    pub fn new(
        backend: Arc<dyn Backend>,
        list_id: &str,
        user_id: &str,
        debounce: Duration,
        notices: NoticeSender,
    ) -> Self {
        Self {
            backend,
            list_id: canonical(list_id).to_string(),
            user_id: user_id.to_string(),
            debounce,
            state: Arc::new(Mutex::new(PadState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            saving: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
            save_lock: Arc::new(tokio::sync::Mutex::new(())),
            notices,
        }
    }

    pub async fn load(&self) -> AppResult<()> {
        match self.backend.note_for_list(&self.list_id).await {
            Ok(note) => {
                if self.cancelled.load(Ordering::SeqCst) {
                    return Ok(());
                }
                let mut state = self.lock();
                state.body = note.as_ref().map(|n| n.body.clone()).unwrap_or_default();
                state.last_saved_at = note.as_ref().map(|n| n.updated_at);
                state.note = note;
                Ok(())
            }
            Err(err) => {
                let _ = self.notices.send(Notice::error("Failed to load note"));
                let mut state = self.lock();
                state.note = None;
                state.body.clear();
                state.last_saved_at = None;
                Err(err)
            }
        }
    }

    pub fn body(&self) -> String {
        self.lock().body.clone()
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.lock().last_saved_at
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    // Records the edit and arms the autosave timer. Each call supersedes
    // any timer still pending.
    pub fn set_body(&self, body: &str) {
        {
            let mut state = self.lock();
            state.body = body.to_string();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let pad = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(pad.debounce).await;
            if pad.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if pad.cancelled.load(Ordering::SeqCst) {
                return;
            }
            let _ = pad.save_current().await;
        });
    }

    // Flushes immediately, disarming any pending timer.
    pub async fn save_now(&self) -> AppResult<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.save_current().await
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    async fn save_current(&self) -> AppResult<()> {
        let _guard = self.save_lock.lock().await;
        let (body, note_id) = {
            let state = self.lock();
            (state.body.clone(), state.note.as_ref().map(|n| n.id.clone()))
        };

        self.saving.store(true, Ordering::SeqCst);
        let result = match note_id {
            Some(id) => self.backend.update_note(&id, &body, &self.user_id).await,
            None => {
                self.backend
                    .insert_note(&self.list_id, NoteDraft { body: body.clone() }, &self.user_id)
                    .await
            }
        };
        self.saving.store(false, Ordering::SeqCst);

        match result {
            Ok(note) => {
                if !self.cancelled.load(Ordering::SeqCst) {
                    let mut state = self.lock();
                    state.last_saved_at = Some(note.updated_at);
                    state.note = Some(note);
                }
                Ok(())
            }
            Err(err) => {
                let _ = self.notices.send(Notice::error("Failed to save note"));
                Err(err)
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PadState> {
        self.state.lock().expect("note pad mutex")
    }
}
