use crate::errors::AppResult;
use crate::models::{
    GroceryDraft, GroceryEntry, GroceryPatch, Invitation, List, NewList, Note, NoteDraft, Role,
    TaskDraft, TaskItem, TaskPatch, UserProfile,
};
use async_trait::async_trait;
use tokio::sync::mpsc;

// The remote service boundary. Everything the core needs from the backend
// goes through this trait; authorization (membership and ownership rules) is
// enforced on the other side of it and only surfaces here as errors.
//
// Identifier arguments and results are canonical strings regardless of how
// the wire encodes them.
#[async_trait]
pub trait Backend: Send + Sync {
    // ─── Directory ──────────────────────────────────────────────────────
    async fn memberships_for(&self, user_id: &str) -> AppResult<Vec<(Role, List)>>;
    async fn profiles_by_ids(&self, ids: &[String]) -> AppResult<Vec<UserProfile>>;
    async fn lists_by_ids(&self, ids: &[String]) -> AppResult<Vec<List>>;

    // ─── List management ────────────────────────────────────────────────
    // Creates the list and the owner membership in one server-side step.
    async fn create_list(&self, draft: NewList) -> AppResult<List>;
    async fn rename_list(&self, list_id: &str, name: &str) -> AppResult<List>;
    // Cascades to items, memberships and invitations for the list.
    async fn delete_list(&self, list_id: &str) -> AppResult<()>;
    async fn leave_list(&self, list_id: &str, user_id: &str) -> AppResult<()>;

    // ─── Identity lookup ────────────────────────────────────────────────
    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<String>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<String>>;
    async fn is_member(&self, list_id: &str, user_id: &str) -> AppResult<bool>;

    // ─── Invitations ────────────────────────────────────────────────────
    // Rejects a second pending invitation for the same (list, invitee)
    // pair with `AppError::Duplicate`.
    async fn insert_invitation(
        &self,
        list_id: &str,
        inviter: &str,
        invitee: &str,
    ) -> AppResult<Invitation>;
    // Pending invitations for the invitee, newest first.
    async fn pending_invitations(&self, user_id: &str) -> AppResult<Vec<Invitation>>;
    // Status transition and membership creation happen in one transaction;
    // the accepted row never exists without its membership.
    async fn accept_invitation(&self, invitation_id: &str) -> AppResult<()>;
    async fn decline_invitation(&self, invitation_id: &str) -> AppResult<Invitation>;
    // Push channel of invitation inserts where `invitee = user_id`. One
    // subscription per session; dropping the receiver ends it.
    async fn subscribe_invitations(&self, user_id: &str) -> AppResult<mpsc::Receiver<Invitation>>;

    // ─── Items ──────────────────────────────────────────────────────────
    async fn list_tasks(&self, list_id: &str) -> AppResult<Vec<TaskItem>>;
    async fn insert_task(&self, list_id: &str, draft: TaskDraft) -> AppResult<TaskItem>;
    async fn update_task(&self, id: &str, patch: TaskPatch) -> AppResult<TaskItem>;
    async fn delete_task(&self, id: &str) -> AppResult<()>;

    async fn list_groceries(&self, list_id: &str) -> AppResult<Vec<GroceryEntry>>;
    async fn insert_grocery(&self, list_id: &str, draft: GroceryDraft) -> AppResult<GroceryEntry>;
    async fn update_grocery(&self, id: &str, patch: GroceryPatch) -> AppResult<GroceryEntry>;
    async fn delete_grocery(&self, id: &str) -> AppResult<()>;

    // A list of kind `note` holds at most one row.
    async fn note_for_list(&self, list_id: &str) -> AppResult<Option<Note>>;
    async fn insert_note(&self, list_id: &str, draft: NoteDraft, updated_by: &str) -> AppResult<Note>;
    async fn update_note(&self, id: &str, body: &str, updated_by: &str) -> AppResult<Note>;
}
