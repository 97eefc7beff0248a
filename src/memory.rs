use crate::backend::Backend;
use crate::errors::{AppError, AppResult};
use crate::models::{
    GroceryDraft, GroceryEntry, GroceryPatch, Invitation, InviteStatus, List, ListKind, Membership,
    NewList, Note, NoteDraft, Role, TaskDraft, TaskItem, TaskPatch, UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

const PUSH_CHANNEL_CAPACITY: usize = 64;

// In-memory stand-in for the remote service: the fixture every test and demo
// runs against. Tables live under one mutex so the accept transaction is
// atomic the same way the real backend's stored procedure is. `fail_next`
// scripts a one-shot failure for a named operation to exercise rollback
// paths.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    profiles: Vec<UserProfile>,
    emails: HashMap<String, String>,
    lists: Vec<List>,
    memberships: Vec<Membership>,
    tasks: Vec<TaskItem>,
    groceries: Vec<GroceryEntry>,
    notes: Vec<Note>,
    invitations: Vec<Invitation>,
    subscribers: Vec<(String, mpsc::Sender<Invitation>)>,
    failures: VecDeque<String>,
    delays: HashMap<String, std::time::Duration>,
    clock_skew: i64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, id: &str, first: &str, last: &str, username: &str, email: &str) {
        let mut state = self.state.lock().expect("memory backend mutex");
        state.profiles.push(UserProfile {
            id: id.to_string(),
            first_name: Some(first.to_string()).filter(|s| !s.is_empty()),
            last_name: Some(last.to_string()).filter(|s| !s.is_empty()),
            username: Some(username.to_lowercase()).filter(|s| !s.is_empty()),
        });
        if !email.is_empty() {
            state.emails.insert(email.to_lowercase(), id.to_string());
        }
    }

    // Queues a single failure for the named operation; the next call with
    // that name returns `AppError::Network` instead of running.
    pub fn fail_next(&self, operation: &str) {
        let mut state = self.state.lock().expect("memory backend mutex");
        state.failures.push_back(operation.to_string());
    }

    // Queues a one-shot latency for the named operation so tests can hold
    // a request in flight while others complete.
    pub fn delay_next(&self, operation: &str, delay: std::time::Duration) {
        let mut state = self.state.lock().expect("memory backend mutex");
        state.delays.insert(operation.to_string(), delay);
    }

    async fn pause_if_scripted(&self, operation: &str) {
        let delay = {
            let mut state = self.state.lock().expect("memory backend mutex");
            state.delays.remove(operation)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn take_failure(state: &mut State, operation: &str) -> AppResult<()> {
        if let Some(index) = state.failures.iter().position(|op| op == operation) {
            state.failures.remove(index);
            return Err(AppError::Network(format!("injected failure: {}", operation)));
        }
        Ok(())
    }

    // Each row insert gets a strictly later timestamp even when two inserts
    // land in the same millisecond; ordering assertions need it.
    fn next_timestamp(state: &mut State) -> DateTime<Utc> {
        state.clock_skew += 1;
        Utc::now() + Duration::milliseconds(state.clock_skew)
    }

    fn notify_subscribers(state: &mut State, invitation: &Invitation) {
        state.subscribers.retain(|(user_id, sender)| {
            if user_id != &invitation.invitee {
                return !sender.is_closed();
            }
            sender.try_send(invitation.clone()).is_ok() || !sender.is_closed()
        });
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn memberships_for(&self, user_id: &str) -> AppResult<Vec<(Role, List)>> {
        self.pause_if_scripted("memberships_for").await;
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "memberships_for")?;
        let rows = state
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                state
                    .lists
                    .iter()
                    .find(|l| l.id == m.list_id)
                    .map(|l| (m.role, l.clone()))
            })
            .collect();
        Ok(rows)
    }

    async fn profiles_by_ids(&self, ids: &[String]) -> AppResult<Vec<UserProfile>> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "profiles_by_ids")?;
        Ok(state
            .profiles
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn lists_by_ids(&self, ids: &[String]) -> AppResult<Vec<List>> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "lists_by_ids")?;
        Ok(state
            .lists
            .iter()
            .filter(|l| ids.contains(&l.id))
            .cloned()
            .collect())
    }

    async fn create_list(&self, draft: NewList) -> AppResult<List> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "create_list")?;
        let created_at = Self::next_timestamp(&mut state);
        let list = List {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            kind: draft.kind,
            created_by: draft.created_by.clone(),
            created_at,
        };
        state.lists.push(list.clone());
        // Owner membership is part of the same insert, as the server trigger
        // does it.
        state.memberships.push(Membership {
            list_id: list.id.clone(),
            user_id: draft.created_by,
            role: Role::Owner,
        });
        Ok(list)
    }

    async fn rename_list(&self, list_id: &str, name: &str) -> AppResult<List> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "rename_list")?;
        let list = state
            .lists
            .iter_mut()
            .find(|l| l.id == list_id)
            .ok_or_else(|| AppError::NotFound(format!("list {}", list_id)))?;
        list.name = name.to_string();
        Ok(list.clone())
    }

    async fn delete_list(&self, list_id: &str) -> AppResult<()> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "delete_list")?;
        if !state.lists.iter().any(|l| l.id == list_id) {
            return Err(AppError::NotFound(format!("list {}", list_id)));
        }
        state.lists.retain(|l| l.id != list_id);
        state.memberships.retain(|m| m.list_id != list_id);
        state.tasks.retain(|t| t.list_id != list_id);
        state.groceries.retain(|g| g.list_id != list_id);
        state.notes.retain(|n| n.list_id != list_id);
        state.invitations.retain(|i| i.list_id != list_id);
        Ok(())
    }

    async fn leave_list(&self, list_id: &str, user_id: &str) -> AppResult<()> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "leave_list")?;
        let before = state.memberships.len();
        state
            .memberships
            .retain(|m| !(m.list_id == list_id && m.user_id == user_id));
        if state.memberships.len() == before {
            return Err(AppError::NotFound(format!(
                "membership {} / {}",
                list_id, user_id
            )));
        }
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<String>> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "find_user_by_username")?;
        let needle = username.trim().to_lowercase();
        Ok(state
            .profiles
            .iter()
            .find(|p| p.username.as_deref() == Some(needle.as_str()))
            .map(|p| p.id.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<String>> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "find_user_by_email")?;
        Ok(state.emails.get(&email.trim().to_lowercase()).cloned())
    }

    async fn is_member(&self, list_id: &str, user_id: &str) -> AppResult<bool> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "is_member")?;
        Ok(state
            .memberships
            .iter()
            .any(|m| m.list_id == list_id && m.user_id == user_id))
    }

    async fn insert_invitation(
        &self,
        list_id: &str,
        inviter: &str,
        invitee: &str,
    ) -> AppResult<Invitation> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "insert_invitation")?;
        // Unique index on the pending (list, invitee) pair.
        if state.invitations.iter().any(|i| {
            i.list_id == list_id && i.invitee == invitee && i.status == InviteStatus::Pending
        }) {
            return Err(AppError::Duplicate(
                "an invite already exists for this user".to_string(),
            ));
        }
        let created_at = Self::next_timestamp(&mut state);
        let invitation = Invitation {
            id: Uuid::new_v4().to_string(),
            list_id: list_id.to_string(),
            inviter: inviter.to_string(),
            invitee: invitee.to_string(),
            status: InviteStatus::Pending,
            created_at,
        };
        state.invitations.push(invitation.clone());
        Self::notify_subscribers(&mut state, &invitation);
        Ok(invitation)
    }

    async fn pending_invitations(&self, user_id: &str) -> AppResult<Vec<Invitation>> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "pending_invitations")?;
        let mut rows: Vec<Invitation> = state
            .invitations
            .iter()
            .filter(|i| i.invitee == user_id && i.status == InviteStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn accept_invitation(&self, invitation_id: &str) -> AppResult<()> {
        self.pause_if_scripted("accept_invitation").await;
        // One lock scope: the status flip and the membership insert commit
        // together or not at all, like the server-side transaction.
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "accept_invitation")?;
        let invitation = state
            .invitations
            .iter_mut()
            .find(|i| i.id == invitation_id)
            .ok_or_else(|| AppError::NotFound(format!("invitation {}", invitation_id)))?;
        if invitation.status != InviteStatus::Pending {
            return Err(AppError::Conflict(format!(
                "invitation is {}",
                invitation.status.as_str()
            )));
        }
        invitation.status = InviteStatus::Accepted;
        let membership = Membership {
            list_id: invitation.list_id.clone(),
            user_id: invitation.invitee.clone(),
            role: Role::Member,
        };
        state.memberships.push(membership);
        Ok(())
    }

    async fn decline_invitation(&self, invitation_id: &str) -> AppResult<Invitation> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "decline_invitation")?;
        let invitation = state
            .invitations
            .iter_mut()
            .find(|i| i.id == invitation_id)
            .ok_or_else(|| AppError::NotFound(format!("invitation {}", invitation_id)))?;
        if invitation.status != InviteStatus::Pending {
            return Err(AppError::Conflict(format!(
                "invitation is {}",
                invitation.status.as_str()
            )));
        }
        invitation.status = InviteStatus::Declined;
        Ok(invitation.clone())
    }

    async fn subscribe_invitations(&self, user_id: &str) -> AppResult<mpsc::Receiver<Invitation>> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "subscribe_invitations")?;
        let (sender, receiver) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
        state.subscribers.push((user_id.to_string(), sender));
        Ok(receiver)
    }

    async fn list_tasks(&self, list_id: &str) -> AppResult<Vec<TaskItem>> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "list_tasks")?;
        let mut rows: Vec<TaskItem> = state
            .tasks
            .iter()
            .filter(|t| t.list_id == list_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_task(&self, list_id: &str, draft: TaskDraft) -> AppResult<TaskItem> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "insert_task")?;
        let created_at = Self::next_timestamp(&mut state);
        let task = TaskItem {
            id: Uuid::new_v4().to_string(),
            list_id: list_id.to_string(),
            title: draft.title.trim().to_string(),
            description: draft
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            priority: draft.priority,
            due_date: draft.due_date,
            completed: false,
            created_at,
        };
        state.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> AppResult<TaskItem> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "update_task")?;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| AppError::NotFound(format!("task {}", id)))?;
        if let Some(title) = patch.title {
            task.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            task.description = Some(description.trim().to_string()).filter(|d| !d.is_empty());
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        Ok(task.clone())
    }

    async fn delete_task(&self, id: &str) -> AppResult<()> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "delete_task")?;
        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != id);
        if state.tasks.len() == before {
            return Err(AppError::NotFound(format!("task {}", id)));
        }
        Ok(())
    }

    async fn list_groceries(&self, list_id: &str) -> AppResult<Vec<GroceryEntry>> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "list_groceries")?;
        let mut rows: Vec<GroceryEntry> = state
            .groceries
            .iter()
            .filter(|g| g.list_id == list_id)
            .cloned()
            .collect();
        // Unchecked first, then oldest first, the order the view renders.
        rows.sort_by(|a, b| {
            a.checked
                .cmp(&b.checked)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(rows)
    }

    async fn insert_grocery(&self, list_id: &str, draft: GroceryDraft) -> AppResult<GroceryEntry> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "insert_grocery")?;
        let created_at = Self::next_timestamp(&mut state);
        let entry = GroceryEntry {
            id: Uuid::new_v4().to_string(),
            list_id: list_id.to_string(),
            name: draft.name.trim().to_string(),
            quantity: draft.quantity.filter(|q| !q.is_empty()),
            checked: false,
            created_at,
        };
        state.groceries.push(entry.clone());
        Ok(entry)
    }

    async fn update_grocery(&self, id: &str, patch: GroceryPatch) -> AppResult<GroceryEntry> {
        self.pause_if_scripted("update_grocery").await;
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "update_grocery")?;
        let entry = state
            .groceries
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| AppError::NotFound(format!("grocery item {}", id)))?;
        if let Some(name) = patch.name {
            entry.name = name.trim().to_string();
        }
        if let Some(quantity) = patch.quantity {
            entry.quantity = Some(quantity).filter(|q| !q.is_empty());
        }
        if let Some(checked) = patch.checked {
            entry.checked = checked;
        }
        Ok(entry.clone())
    }

    async fn delete_grocery(&self, id: &str) -> AppResult<()> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "delete_grocery")?;
        let before = state.groceries.len();
        state.groceries.retain(|g| g.id != id);
        if state.groceries.len() == before {
            return Err(AppError::NotFound(format!("grocery item {}", id)));
        }
        Ok(())
    }

    async fn note_for_list(&self, list_id: &str) -> AppResult<Option<Note>> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "note_for_list")?;
        Ok(state.notes.iter().find(|n| n.list_id == list_id).cloned())
    }

    async fn insert_note(
        &self,
        list_id: &str,
        draft: NoteDraft,
        updated_by: &str,
    ) -> AppResult<Note> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "insert_note")?;
        if state.notes.iter().any(|n| n.list_id == list_id) {
            return Err(AppError::Conflict(format!(
                "list {} already has a note",
                list_id
            )));
        }
        let updated_at = Self::next_timestamp(&mut state);
        let note = Note {
            id: Uuid::new_v4().to_string(),
            list_id: list_id.to_string(),
            body: draft.body,
            updated_by: Some(updated_by.to_string()),
            updated_at,
        };
        state.notes.push(note.clone());
        Ok(note)
    }

    async fn update_note(&self, id: &str, body: &str, updated_by: &str) -> AppResult<Note> {
        let mut state = self.state.lock().expect("memory backend mutex");
        Self::take_failure(&mut state, "update_note")?;
        let updated_at = Self::next_timestamp(&mut state);
        let note = state
            .notes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| AppError::NotFound(format!("note {}", id)))?;
        note.body = body.to_string();
        note.updated_by = Some(updated_by.to_string());
        note.updated_at = updated_at;
        Ok(note.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryBackend;
    use crate::backend::Backend;
    use crate::errors::AppError;
    use crate::models::{InviteStatus, ListKind, NewList};

    fn new_list() -> NewList {
        NewList {
            name: "Groceries".to_string(),
            kind: ListKind::Grocery,
            created_by: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn create_list_adds_owner_membership() {
        let backend = MemoryBackend::new();
        let list = backend.create_list(new_list()).await.expect("create");
        assert!(backend.is_member(&list.id, "alice").await.expect("member"));
    }

    #[tokio::test]
    async fn accept_creates_membership_with_status_flip() {
        let backend = MemoryBackend::new();
        let list = backend.create_list(new_list()).await.expect("create");
        let invitation = backend
            .insert_invitation(&list.id, "alice", "bob")
            .await
            .expect("invite");

        backend.accept_invitation(&invitation.id).await.expect("accept");

        assert!(backend.is_member(&list.id, "bob").await.expect("member"));
        assert!(backend
            .pending_invitations("bob")
            .await
            .expect("pending")
            .is_empty());
    }

    #[tokio::test]
    async fn pending_pair_is_unique_until_declined() {
        let backend = MemoryBackend::new();
        let list = backend.create_list(new_list()).await.expect("create");
        let first = backend
            .insert_invitation(&list.id, "alice", "bob")
            .await
            .expect("invite");

        let duplicate = backend.insert_invitation(&list.id, "alice", "bob").await;
        assert!(matches!(duplicate, Err(AppError::Duplicate(_))));

        let declined = backend
            .decline_invitation(&first.id)
            .await
            .expect("decline");
        assert_eq!(declined.status, InviteStatus::Declined);

        backend
            .insert_invitation(&list.id, "alice", "bob")
            .await
            .expect("re-invite after decline");
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let backend = MemoryBackend::new();
        backend.fail_next("list_tasks");
        assert!(backend.list_tasks("l1").await.is_err());
        assert!(backend.list_tasks("l1").await.is_ok());
    }

    #[tokio::test]
    async fn subscription_sees_only_own_inserts() {
        let backend = MemoryBackend::new();
        let list = backend.create_list(new_list()).await.expect("create");
        let mut bob_rx = backend
            .subscribe_invitations("bob")
            .await
            .expect("subscribe");

        backend
            .insert_invitation(&list.id, "alice", "carol")
            .await
            .expect("invite carol");
        backend
            .insert_invitation(&list.id, "alice", "bob")
            .await
            .expect("invite bob");

        let delivered = bob_rx.recv().await.expect("push event");
        assert_eq!(delivered.invitee, "bob");
        assert!(bob_rx.try_recv().is_err());
    }
}
