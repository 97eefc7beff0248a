use listhub::{
    AppError, Backend, CoreConfig, DirectoryService, GroceryDraft, GroceryPatch, ListKind,
    MemoryBackend, NoticeLevel, Role, SelectionManager, Session, TaskDraft, TaskPatch,
};
use listhub::db::Storage;
use std::sync::Arc;
use std::time::Duration;

fn seeded_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_user("alice", "Ada", "Lovelace", "ada", "ada@example.com");
    backend.add_user("bob", "Bob", "Barker", "bob", "bob@example.com");
    backend
}

async fn sign_in(backend: Arc<MemoryBackend>, user_id: &str) -> Session {
    Session::sign_in(user_id, backend, CoreConfig::default())
        .await
        .expect("sign in")
}

async fn drain_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..50 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn invite_accept_share_flow() {
    let backend = seeded_backend();

    let alice = sign_in(backend.clone(), "alice").await;
    let groceries = alice
        .create_list("Groceries", ListKind::Grocery)
        .await
        .expect("create list");

    let bob = sign_in(backend.clone(), "bob").await;
    let mut bob_notices = bob.take_notices().expect("notices");
    assert!(bob.lists().is_empty());

    // Alice invites bob by handle; bob's bell lights up via the push
    // channel without any explicit refresh.
    alice
        .invites()
        .send(groceries.id(), "bob")
        .await
        .expect("send invite");
    drain_until(|| bob.invites().pending_count() == 1).await;

    let pending = bob.invites().pending();
    assert_eq!(pending[0].list_name, "Groceries");
    assert_eq!(pending[0].inviter_name, "ada");
    let push_notice = bob_notices.recv().await.expect("push notice");
    assert_eq!(push_notice.level, NoticeLevel::Info);

    // Accepting joins the list, clears the badge and activates the list.
    bob.invites().accept(&pending[0].id).await.expect("accept");

    assert_eq!(bob.invites().pending_count(), 0);
    let lists = bob.lists();
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].list.name, "Groceries");
    assert_eq!(lists[0].role, Role::Member);
    assert_eq!(bob.active_list(), Some(groceries.id().to_string()));

    // The invite row is terminal on the backend side too.
    assert!(backend
        .pending_invitations("bob")
        .await
        .expect("pending")
        .is_empty());
}

#[tokio::test]
async fn accept_is_atomic_with_membership() {
    let backend = seeded_backend();
    let alice = sign_in(backend.clone(), "alice").await;
    let list = alice
        .create_list("Trip", ListKind::Note)
        .await
        .expect("create list");
    let invitation = backend
        .insert_invitation(list.id(), "alice", "bob")
        .await
        .expect("invite");

    // A failed accept leaves neither the status flip nor the membership.
    backend.fail_next("accept_invitation");
    assert!(backend.accept_invitation(&invitation.id).await.is_err());
    assert!(!backend.is_member(list.id(), "bob").await.expect("member"));
    assert_eq!(
        backend.pending_invitations("bob").await.expect("pending").len(),
        1
    );

    // A successful accept leaves both.
    backend
        .accept_invitation(&invitation.id)
        .await
        .expect("accept");
    assert!(backend.is_member(list.id(), "bob").await.expect("member"));
    assert!(backend
        .pending_invitations("bob")
        .await
        .expect("pending")
        .is_empty());
}

#[tokio::test]
async fn duplicate_invite_is_rejected_until_declined() {
    let backend = seeded_backend();
    let alice = sign_in(backend.clone(), "alice").await;
    let list = alice
        .create_list("Errands", ListKind::Task)
        .await
        .expect("create list");

    let first = alice.invites().send(list.id(), "bob").await.expect("send");
    assert!(matches!(
        alice.invites().send(list.id(), "bob").await,
        Err(AppError::Duplicate(_))
    ));

    backend.decline_invitation(&first.id).await.expect("decline");
    alice
        .invites()
        .send(list.id(), "bob")
        .await
        .expect("resend after decline");
}

#[tokio::test]
async fn failed_check_reverts_with_one_notice() {
    let backend = seeded_backend();
    let alice = sign_in(backend.clone(), "alice").await;
    let list = alice
        .create_list("Groceries", ListKind::Grocery)
        .await
        .expect("create list");
    let mut notices = alice.take_notices().expect("notices");
    // Skip the "List created" notice.
    let _ = notices.try_recv();

    let groceries = alice.groceries(list.id()).expect("collection");
    let milk = groceries
        .create(GroceryDraft {
            name: "Milk".to_string(),
            quantity: None,
        })
        .await
        .expect("add milk");

    backend.fail_next("update_grocery");
    assert!(groceries
        .update(&milk.id, GroceryPatch::checked(true))
        .await
        .is_err());

    let items = groceries.snapshot();
    assert!(!items[0].checked, "milk reverts to unchecked");
    let notice = notices.try_recv().expect("error notice");
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(notices.try_recv().is_err(), "exactly one notice fires");
}

#[tokio::test]
async fn toggle_rollback_targets_the_failed_request() {
    let backend = seeded_backend();
    let alice = sign_in(backend.clone(), "alice").await;
    let list = alice
        .create_list("Today", ListKind::Task)
        .await
        .expect("create list");

    let tasks = alice.tasks(list.id()).expect("collection");
    let task = tasks
        .create(TaskDraft {
            title: "Water plants".to_string(),
            description: None,
            priority: listhub::Priority::Medium,
            due_date: None,
        })
        .await
        .expect("add task");

    // Complete, reopen, complete again; only the last call fails. The item
    // must come back to the state at that call's issue time (reopened),
    // not to the mount state.
    tasks
        .update(&task.id, TaskPatch::completed(true))
        .await
        .expect("complete");
    tasks
        .update(&task.id, TaskPatch::completed(false))
        .await
        .expect("reopen");
    backend.fail_next("update_task");
    assert!(tasks
        .update(&task.id, TaskPatch::completed(true))
        .await
        .is_err());

    assert!(!tasks.snapshot()[0].completed);
}

#[tokio::test]
async fn reload_applies_the_remembered_list_before_the_directory_resolves() {
    let backend = seeded_backend();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = CoreConfig::with_storage_path(dir.path().join("client.sqlite"));

    let session = Session::sign_in("alice", backend.clone(), config.clone())
        .await
        .expect("sign in");
    session
        .create_list("Personal", ListKind::Task)
        .await
        .expect("create");
    let work = session
        .create_list("Work", ListKind::Task)
        .await
        .expect("create");
    let work_id = work.id().to_string();
    session.select_list(Some(&work_id));
    session.sign_out();

    // The reload: restoration happens synchronously from storage while the
    // directory request is parked in flight.
    let storage = Storage::open(&dir.path().join("client.sqlite")).expect("storage");
    let selection = SelectionManager::new(Arc::new(storage));
    let directory = DirectoryService::new(
        backend.clone(),
        selection.clone(),
        Duration::from_millis(400),
    );

    backend.delay_next("memberships_for", Duration::from_millis(50));
    selection.restore("alice");
    assert_eq!(
        selection.active(),
        Some(work_id.clone()),
        "remembered id applies before the directory call resolves"
    );

    let entries = directory.refresh("alice").await;
    assert_eq!(entries.len(), 2);
    assert_eq!(
        selection.active(),
        Some(work_id),
        "selection unchanged once the directory confirms the list"
    );
}

#[tokio::test]
async fn unsubscribed_session_stops_receiving_pushes() {
    let backend = seeded_backend();
    let alice = sign_in(backend.clone(), "alice").await;
    let list = alice
        .create_list("Groceries", ListKind::Grocery)
        .await
        .expect("create list");

    let bob = sign_in(backend.clone(), "bob").await;
    bob.invites().unsubscribe();

    alice
        .invites()
        .send(list.id(), "bob")
        .await
        .expect("send invite");
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The invitation exists remotely but the torn-down channel no longer
    // feeds the local cache.
    assert_eq!(
        backend.pending_invitations("bob").await.expect("pending").len(),
        1
    );
    assert_eq!(bob.invites().pending_count(), 0);
}
