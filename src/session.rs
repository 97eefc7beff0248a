use crate::adapters::groceries::GroceriesAdapter;
use crate::adapters::notes::{NotePad, NotesAdapter};
use crate::adapters::tasks::TasksAdapter;
use crate::backend::Backend;
use crate::collection::Collection;
use crate::config::CoreConfig;
use crate::db::Storage;
use crate::directory::DirectoryService;
use crate::errors::{AppError, AppResult};
use crate::invites::InviteChannel;
use crate::models::{ListEntry, ListKind, NewList, Notice, NoticeReceiver, NoticeSender};
use crate::selection::SelectionManager;
use std::sync::{Arc, Mutex};

// One signed-in user's session: the single owner of the directory and the
// active selection, wired together at sign-in and torn down at sign-out.
// Dependents receive handles from here instead of reaching into ambient
// state.
pub struct Session {
    user_id: String,
    backend: Arc<dyn Backend>,
    config: CoreConfig,
    directory: DirectoryService,
    selection: SelectionManager,
    invites: InviteChannel,
    notices_tx: NoticeSender,
    notices_rx: Mutex<Option<NoticeReceiver>>,
}

impl Session {
    // Builds the session state for a signed-in user: durable storage,
    // early-restored selection, a first directory load and the invitation
    // subscription.
    pub async fn sign_in(
        user_id: &str,
        backend: Arc<dyn Backend>,
        config: CoreConfig,
    ) -> AppResult<Self> {
        let storage = match &config.storage_path {
            Some(path) => Storage::open(path)?,
            None => Storage::open_in_memory()?,
        };
        let (notices_tx, notices_rx) = tokio::sync::mpsc::unbounded_channel();

        let selection = SelectionManager::new(Arc::new(storage));
        // Apply the remembered list before any network round trip so the
        // first render doesn't default to an arbitrary list.
        selection.restore(user_id);

        let directory = DirectoryService::new(
            backend.clone(),
            selection.clone(),
            config.refresh_cooldown,
        );
        let invites = InviteChannel::new(
            backend.clone(),
            directory.clone(),
            selection.clone(),
            user_id,
            notices_tx.clone(),
        );

        directory.ensure_fresh(user_id).await;
        if let Err(err) = invites.refresh_pending().await {
            tracing::warn!(user_id, error = %err, "initial invite load failed");
        }
        invites.subscribe().await?;

        Ok(Self {
            user_id: user_id.to_string(),
            backend,
            config,
            directory,
            selection,
            invites,
            notices_tx,
            notices_rx: Mutex::new(Some(notices_rx)),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    // ─── Directory and selection ────────────────────────────────────────

    pub fn lists(&self) -> Vec<ListEntry> {
        self.directory.entries()
    }

    pub fn active_list(&self) -> Option<String> {
        self.selection.active()
    }

    pub fn select_list(&self, list_id: Option<&str>) {
        self.selection.select(list_id);
    }

    pub async fn refresh(&self) -> Vec<ListEntry> {
        self.directory.refresh(&self.user_id).await
    }

    // ─── List management ────────────────────────────────────────────────

    pub async fn create_list(&self, name: &str, kind: ListKind) -> AppResult<ListEntry> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Conflict("list name is required".to_string()));
        }
        let list = self
            .backend
            .create_list(NewList {
                name: name.to_string(),
                kind,
                created_by: self.user_id.clone(),
            })
            .await?;

        let entries = self.directory.refresh(&self.user_id).await;
        self.selection.select(Some(&list.id));
        let _ = self.notices_tx.send(Notice::success("List created"));
        entries
            .into_iter()
            .find(|e| e.id() == list.id)
            .ok_or_else(|| AppError::Invariant("created list missing from directory".to_string()))
    }

    pub async fn rename_list(&self, list_id: &str, name: &str) -> AppResult<()> {
        self.backend.rename_list(list_id, name.trim()).await?;
        self.directory.refresh(&self.user_id).await;
        Ok(())
    }

    // Owner-only; the active selection falls back to the next list (or
    // nothing) through the post-refresh reconcile.
    pub async fn delete_list(&self, list_id: &str) -> AppResult<()> {
        self.backend.delete_list(list_id).await?;
        self.directory.refresh(&self.user_id).await;
        Ok(())
    }

    // Drops this user's own membership of someone else's list.
    pub async fn leave_list(&self, list_id: &str) -> AppResult<()> {
        self.backend.leave_list(list_id, &self.user_id).await?;
        self.directory.refresh(&self.user_id).await;
        Ok(())
    }

    // ─── Item collections ───────────────────────────────────────────────

    pub fn tasks(&self, list_id: &str) -> AppResult<Collection<TasksAdapter>> {
        self.expect_kind(list_id, ListKind::Task)?;
        Ok(Collection::new(
            TasksAdapter::new(self.backend.clone()),
            list_id,
            self.notices_tx.clone(),
        ))
    }

    pub fn groceries(&self, list_id: &str) -> AppResult<Collection<GroceriesAdapter>> {
        self.expect_kind(list_id, ListKind::Grocery)?;
        Ok(Collection::new(
            GroceriesAdapter::new(self.backend.clone()),
            list_id,
            self.notices_tx.clone(),
        ))
    }

    pub fn notepad(&self, list_id: &str) -> AppResult<NotePad> {
        self.expect_kind(list_id, ListKind::Note)?;
        Ok(NotePad::new(
            self.backend.clone(),
            list_id,
            &self.user_id,
            self.config.note_autosave_debounce,
            self.notices_tx.clone(),
        ))
    }

    // The notes adapter as a plain item store, for callers that want the
    // uniform repository shape instead of the editor.
    pub fn notes_adapter(&self) -> NotesAdapter {
        NotesAdapter::new(self.backend.clone(), &self.user_id)
    }

    // ─── Invitations ────────────────────────────────────────────────────

    pub fn invites(&self) -> &InviteChannel {
        &self.invites
    }

    // ─── Notices ────────────────────────────────────────────────────────

    // Hands the notice stream to the presentation layer. One receiver per
    // session; later calls return `None`.
    pub fn take_notices(&self) -> Option<NoticeReceiver> {
        self.notices_rx.lock().expect("notices mutex").take()
    }

    // Tears the session down: closes the push subscription and drops all
    // client state. The remembered selection stays in durable storage for
    // the next sign-in.
    pub fn sign_out(self) {
        self.invites.unsubscribe();
        self.directory.reset();
        self.selection.clear();
    }

    fn expect_kind(&self, list_id: &str, kind: ListKind) -> AppResult<()> {
        match self.directory.find(list_id) {
            Some(entry) if entry.list.kind == kind => Ok(()),
            Some(entry) => Err(AppError::Invariant(format!(
                "list {} is a {} list, not {}",
                list_id,
                entry.list.kind.as_str(),
                kind.as_str()
            ))),
            None => Err(AppError::NotFound(format!("list {}", list_id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Session;
    use crate::backend::Backend;
    use crate::config::CoreConfig;
    use crate::errors::AppError;
    use crate::memory::MemoryBackend;
    use crate::models::ListKind;
    use std::sync::Arc;

    async fn session_for(backend: Arc<MemoryBackend>, user_id: &str) -> Session {
        Session::sign_in(user_id, backend, CoreConfig::default())
            .await
            .expect("sign in")
    }

    #[tokio::test]
    async fn create_list_selects_it() {
        let backend = Arc::new(MemoryBackend::new());
        let session = session_for(backend, "alice").await;

        let entry = session
            .create_list("Groceries", ListKind::Grocery)
            .await
            .expect("create");
        assert_eq!(session.active_list(), Some(entry.id().to_string()));
        assert_eq!(session.lists().len(), 1);
    }

    #[tokio::test]
    async fn collections_check_the_list_kind() {
        let backend = Arc::new(MemoryBackend::new());
        let session = session_for(backend, "alice").await;
        let entry = session
            .create_list("Groceries", ListKind::Grocery)
            .await
            .expect("create");

        assert!(session.groceries(entry.id()).is_ok());
        assert!(matches!(
            session.tasks(entry.id()),
            Err(AppError::Invariant(_))
        ));
        assert!(matches!(
            session.tasks("missing"),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_the_active_list_falls_back() {
        let backend = Arc::new(MemoryBackend::new());
        let session = session_for(backend, "alice").await;
        let first = session
            .create_list("First", ListKind::Task)
            .await
            .expect("create");
        let second = session
            .create_list("Second", ListKind::Task)
            .await
            .expect("create");

        assert_eq!(session.active_list(), Some(second.id().to_string()));
        session.delete_list(second.id()).await.expect("delete");
        assert_eq!(session.active_list(), Some(first.id().to_string()));

        session.delete_list(first.id()).await.expect("delete");
        assert_eq!(session.active_list(), None);
    }

    #[tokio::test]
    async fn notices_receiver_is_single_use() {
        let backend = Arc::new(MemoryBackend::new());
        let session = session_for(backend, "alice").await;
        assert!(session.take_notices().is_some());
        assert!(session.take_notices().is_none());
    }

    #[tokio::test]
    async fn sign_out_keeps_the_remembered_selection_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = CoreConfig::with_storage_path(dir.path().join("client.sqlite"));
        let backend = Arc::new(MemoryBackend::new());

        let session = Session::sign_in("alice", backend.clone(), config.clone())
            .await
            .expect("sign in");
        let entry = session
            .create_list("Work", ListKind::Task)
            .await
            .expect("create");
        let expected = entry.id().to_string();
        session.sign_out();

        let session = Session::sign_in("alice", backend, config)
            .await
            .expect("second sign in");
        assert_eq!(session.active_list(), Some(expected));
    }

    #[tokio::test]
    async fn leaving_a_shared_list_removes_it_from_the_directory() {
        let backend = Arc::new(MemoryBackend::new());
        let alice = session_for(backend.clone(), "alice").await;
        let entry = alice
            .create_list("Shared", ListKind::Task)
            .await
            .expect("create");
        let invitation = backend
            .insert_invitation(entry.id(), "alice", "bob")
            .await
            .expect("invite");
        backend
            .accept_invitation(&invitation.id)
            .await
            .expect("accept");

        let bob = session_for(backend, "bob").await;
        assert_eq!(bob.lists().len(), 1);
        bob.leave_list(entry.id()).await.expect("leave");
        assert!(bob.lists().is_empty());
        assert_eq!(bob.active_list(), None);
    }
}
