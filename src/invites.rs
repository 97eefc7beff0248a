use crate::backend::Backend;
use crate::directory::DirectoryService;
use crate::errors::{AppError, AppResult};
use crate::models::{Invitation, InviteStatus, Notice, NoticeSender, PendingInvite, UserProfile};
use crate::selection::SelectionManager;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::task::{JoinHandle, JoinSet};

// Invitations run outside the request/response flow of the rest of the core:
// sends and accepts are explicit calls, but new invitations arrive over a
// push channel consumed by a background task. Accepting folds the new
// membership back into the directory and re-targets the active selection
// (the post-acceptance cascade).
#[derive(Clone)]
pub struct InviteChannel {
    backend: Arc<dyn Backend>,
    directory: DirectoryService,
    selection: SelectionManager,
    user_id: String,
    pending: Arc<Mutex<Vec<PendingInvite>>>,
    seen: Arc<Mutex<HashSet<String>>>,
    subscription: Arc<Mutex<Option<JoinHandle<()>>>>,
    notices: NoticeSender,
}

impl InviteChannel {
    pub fn new(
        backend: Arc<dyn Backend>,
        directory: DirectoryService,
        selection: SelectionManager,
        user_id: &str,
        notices: NoticeSender,
    ) -> Self {
        Self {
            backend,
            directory,
            selection,
            user_id: user_id.to_string(),
            pending: Arc::new(Mutex::new(Vec::new())),
            seen: Arc::new(Mutex::new(HashSet::new())),
            subscription: Arc::new(Mutex::new(None)),
            notices,
        }
    }

    // Invites a user by username or email (anything containing `@` is
    // treated as an email). Every failure mode is distinct: `NotFound`,
    // `SelfInvite`, `AlreadyMember`, `Duplicate`.
    pub async fn send(&self, list_id: &str, identifier: &str) -> AppResult<Invitation> {
        let identifier = identifier.trim().to_lowercase();
        if identifier.is_empty() {
            return Err(AppError::NotFound("username or email is required".to_string()));
        }

        let invitee = if identifier.contains('@') {
            self.backend.find_user_by_email(&identifier).await?
        } else {
            self.backend.find_user_by_username(&identifier).await?
        };
        let Some(invitee) = invitee else {
            return Err(AppError::NotFound(
                "no user found with that username or email".to_string(),
            ));
        };
        if invitee == self.user_id {
            return Err(AppError::SelfInvite);
        }
        if self.backend.is_member(list_id, &invitee).await? {
            return Err(AppError::AlreadyMember(
                "that user is already a member of this list".to_string(),
            ));
        }

        let invitation = self
            .backend
            .insert_invitation(list_id, &self.user_id, &invitee)
            .await?;
        let _ = self.notices.send(Notice::success("Invite sent"));
        Ok(invitation)
    }

    // Reloads the pending cache: invitations for this user, newest first,
    // enriched with the list's and inviter's display names. A failed load
    // keeps the previous cache.
    pub async fn refresh_pending(&self) -> AppResult<Vec<PendingInvite>> {
        let invitations = self.backend.pending_invitations(&self.user_id).await?;
        let enriched = self.enrich(invitations).await;
        *self.lock_pending() = enriched.clone();
        Ok(enriched)
    }

    pub fn pending(&self) -> Vec<PendingInvite> {
        self.lock_pending().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    // Opens the push subscription for this user. Safe to call repeatedly;
    // only one subscription exists per session.
    pub async fn subscribe(&self) -> AppResult<()> {
        if self.lock_subscription().is_some() {
            return Ok(());
        }
        let mut receiver = self.backend.subscribe_invitations(&self.user_id).await?;

        let mut guard = self.lock_subscription();
        if guard.is_some() {
            // Lost a race with another subscribe; dropping the extra
            // receiver closes it.
            return Ok(());
        }
        let channel = self.clone();
        *guard = Some(tokio::spawn(async move {
            while let Some(invitation) = receiver.recv().await {
                channel.on_push(invitation).await;
            }
        }));
        Ok(())
    }

    // Tears the subscription down. Idempotent; part of sign-out.
    pub fn unsubscribe(&self) {
        if let Some(handle) = self.lock_subscription().take() {
            handle.abort();
        }
    }

    pub async fn accept(&self, invite_id: &str) -> AppResult<()> {
        let target = self
            .lock_pending()
            .iter()
            .find(|i| i.id == invite_id)
            .cloned();

        if let Err(err) = self.backend.accept_invitation(invite_id).await {
            let _ = self.notices.send(Notice::error("Could not accept invite"));
            return Err(err);
        }

        // Drop the row locally right away; the badge must not keep counting
        // an invitation that no longer exists.
        self.lock_pending().retain(|i| i.id != invite_id);

        match target {
            Some(invite) => {
                self.cascade(&invite.list_id, Some(&invite.list_name)).await;
            }
            None => {
                // Accepted outside the cached view; still fold the
                // membership into the directory.
                self.directory.refresh(&self.user_id).await;
            }
        }
        Ok(())
    }

    pub async fn decline(&self, invite_id: &str) -> AppResult<()> {
        if let Err(err) = self.backend.decline_invitation(invite_id).await {
            let _ = self.notices.send(Notice::error("Could not decline invite"));
            return Err(err);
        }
        self.lock_pending().retain(|i| i.id != invite_id);
        let _ = self.notices.send(Notice::success("Invite declined"));
        let _ = self.refresh_pending().await;
        Ok(())
    }

    // Accepts every cached pending invitation concurrently. Each accept is
    // independently atomic; partial failure is reported as a count and the
    // successes stand. The newest accepted invitation's list becomes
    // active.
    pub async fn accept_all(&self) -> AppResult<usize> {
        let snapshot = self.lock_pending().clone();
        if snapshot.is_empty() {
            return Ok(0);
        }

        let mut joins = JoinSet::new();
        for invite in snapshot {
            let backend = self.backend.clone();
            joins.spawn(async move {
                let accepted = backend.accept_invitation(&invite.id).await.is_ok();
                (invite, accepted)
            });
        }

        let mut accepted = Vec::new();
        let mut failures = 0usize;
        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok((invite, true)) => accepted.push(invite),
                Ok((_, false)) => failures += 1,
                Err(_) => failures += 1,
            }
        }

        if failures > 0 {
            let _ = self
                .notices
                .send(Notice::error(format!("Some invites failed ({}).", failures)));
        } else {
            let plural = if accepted.len() == 1 { "" } else { "s" };
            let _ = self.notices.send(Notice::success(format!(
                "Joined {} list{}",
                accepted.len(),
                plural
            )));
        }

        {
            let mut pending = self.lock_pending();
            pending.retain(|i| !accepted.iter().any(|a| a.id == i.id));
        }

        // Activation tie-break is creation recency, not display order.
        if let Some(newest) = accepted.iter().max_by_key(|i| i.created_at) {
            self.cascade(&newest.list_id, Some(&newest.list_name)).await;
        }
        Ok(failures)
    }

    // One-click accept of the newest pending invitation.
    pub async fn accept_latest(&self) -> AppResult<()> {
        let newest = match self.lock_pending().first().cloned() {
            Some(invite) => Some(invite),
            None => self.refresh_pending().await?.first().cloned(),
        };
        let Some(invite) = newest else {
            return Err(AppError::NotFound("no pending invites".to_string()));
        };
        self.accept(&invite.id).await
    }

    // The post-acceptance cascade: refresh the directory for this user,
    // activate the joined list, announce it.
    async fn cascade(&self, list_id: &str, list_name: Option<&str>) {
        let entries = self.directory.refresh(&self.user_id).await;
        let target = entries
            .iter()
            .find(|e| e.id() == list_id)
            .map(|e| e.id().to_string())
            .unwrap_or_else(|| list_id.to_string());
        self.selection.select(Some(&target));
        let _ = self.notices.send(Notice::success(format!(
            "Joined \"{}\"",
            list_name.unwrap_or("list")
        )));
    }

    async fn on_push(&self, invitation: Invitation) {
        if invitation.status != InviteStatus::Pending {
            return;
        }
        {
            let mut seen = self.lock_seen();
            if !seen.insert(invitation.id.clone()) {
                return;
            }
        }
        let _ = self.notices.send(Notice::info("You have a new list invite."));
        if let Err(err) = self.refresh_pending().await {
            tracing::warn!(user_id = %self.user_id, error = %err, "pending invite refresh failed");
        }
    }

    async fn enrich(&self, invitations: Vec<Invitation>) -> Vec<PendingInvite> {
        let mut list_ids: Vec<String> = Vec::new();
        let mut inviter_ids: Vec<String> = Vec::new();
        for invitation in &invitations {
            if !list_ids.contains(&invitation.list_id) {
                list_ids.push(invitation.list_id.clone());
            }
            if !inviter_ids.contains(&invitation.inviter) {
                inviter_ids.push(invitation.inviter.clone());
            }
        }

        let list_names: HashMap<String, String> = match self.backend.lists_by_ids(&list_ids).await {
            Ok(lists) => lists.into_iter().map(|l| (l.id.clone(), l.name)).collect(),
            Err(err) => {
                tracing::warn!(error = %err, "list lookup for invites failed");
                HashMap::new()
            }
        };
        let inviters: HashMap<String, UserProfile> =
            match self.backend.profiles_by_ids(&inviter_ids).await {
                Ok(profiles) => profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
                Err(err) => {
                    tracing::warn!(error = %err, "inviter lookup failed");
                    HashMap::new()
                }
            };

        invitations
            .into_iter()
            .map(|invitation| PendingInvite {
                list_name: list_names
                    .get(&invitation.list_id)
                    .cloned()
                    .unwrap_or_else(|| "Untitled".to_string()),
                inviter_name: inviters
                    .get(&invitation.inviter)
                    .and_then(|p| p.username.clone())
                    .unwrap_or_else(|| "Someone".to_string()),
                id: invitation.id,
                list_id: invitation.list_id,
                inviter_id: invitation.inviter,
                created_at: invitation.created_at,
            })
            .collect()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<PendingInvite>> {
        self.pending.lock().expect("pending invites mutex")
    }

    fn lock_seen(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.seen.lock().expect("seen invites mutex")
    }

    fn lock_subscription(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.subscription.lock().expect("subscription mutex")
    }
}

#[cfg(test)]
mod tests {
    use super::InviteChannel;
    use crate::backend::Backend;
    use crate::db::Storage;
    use crate::directory::DirectoryService;
    use crate::errors::AppError;
    use crate::memory::MemoryBackend;
    use crate::models::{ListKind, NewList, NoticeLevel};
    use crate::selection::SelectionManager;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        channel: InviteChannel,
        selection: SelectionManager,
        notices: mpsc::UnboundedReceiver<crate::models::Notice>,
    }

    fn channel_for(backend: Arc<MemoryBackend>, user_id: &str) -> Fixture {
        let selection = SelectionManager::new(Arc::new(Storage::open_in_memory().expect("storage")));
        selection.restore(user_id);
        let directory = DirectoryService::new(
            backend.clone(),
            selection.clone(),
            Duration::from_millis(400),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = InviteChannel::new(backend.clone(), directory, selection.clone(), user_id, tx);
        Fixture {
            backend,
            channel,
            selection,
            notices: rx,
        }
    }

    async fn seeded_backend() -> (Arc<MemoryBackend>, String) {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_user("alice", "Ada", "Lovelace", "ada", "ada@example.com");
        backend.add_user("bob", "Bob", "Barker", "bob", "bob@example.com");
        let list = backend
            .create_list(NewList {
                name: "Groceries".to_string(),
                kind: ListKind::Grocery,
                created_by: "alice".to_string(),
            })
            .await
            .expect("create list");
        (backend, list.id)
    }

    #[tokio::test]
    async fn send_resolves_username_and_email() {
        let (backend, list_id) = seeded_backend().await;
        let fixture = channel_for(backend, "alice");

        let invitation = fixture.channel.send(&list_id, "Bob").await.expect("by username");
        assert_eq!(invitation.invitee, "bob");

        fixture
            .backend
            .decline_invitation(&invitation.id)
            .await
            .expect("clear pending");
        let invitation = fixture
            .channel
            .send(&list_id, "BOB@example.com")
            .await
            .expect("by email");
        assert_eq!(invitation.invitee, "bob");
    }

    #[tokio::test]
    async fn send_failure_modes_are_distinct() {
        let (backend, list_id) = seeded_backend().await;
        let fixture = channel_for(backend.clone(), "alice");

        assert!(matches!(
            fixture.channel.send(&list_id, "nobody").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fixture.channel.send(&list_id, "ada").await,
            Err(AppError::SelfInvite)
        ));

        fixture.channel.send(&list_id, "bob").await.expect("first invite");
        assert!(matches!(
            fixture.channel.send(&list_id, "bob").await,
            Err(AppError::Duplicate(_))
        ));

        backend.add_user("carol", "Carol", "", "carol", "");
        let invitation = fixture.channel.send(&list_id, "carol").await.expect("invite carol");
        backend
            .accept_invitation(&invitation.id)
            .await
            .expect("carol joins");
        assert!(matches!(
            fixture.channel.send(&list_id, "carol").await,
            Err(AppError::AlreadyMember(_))
        ));
    }

    #[tokio::test]
    async fn pending_cache_is_enriched_and_newest_first() {
        let (backend, list_id) = seeded_backend().await;
        backend.add_user("carol", "Carol", "", "carol", "");
        let second = backend
            .create_list(NewList {
                name: "Work".to_string(),
                kind: ListKind::Task,
                created_by: "carol".to_string(),
            })
            .await
            .expect("create list");

        backend
            .insert_invitation(&list_id, "alice", "bob")
            .await
            .expect("first invite");
        backend
            .insert_invitation(&second.id, "carol", "bob")
            .await
            .expect("second invite");

        let fixture = channel_for(backend, "bob");
        let pending = fixture.channel.refresh_pending().await.expect("refresh");

        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].list_name, "Work");
        assert_eq!(pending[0].inviter_name, "carol");
        assert_eq!(pending[1].list_name, "Groceries");
        assert_eq!(pending[1].inviter_name, "ada");
        assert_eq!(fixture.channel.pending_count(), 2);
    }

    #[tokio::test]
    async fn push_events_dedupe_within_a_session() {
        let (backend, list_id) = seeded_backend().await;
        let mut fixture = channel_for(backend.clone(), "bob");

        let invitation = backend
            .insert_invitation(&list_id, "alice", "bob")
            .await
            .expect("invite");

        fixture.channel.on_push(invitation.clone()).await;
        fixture.channel.on_push(invitation).await;

        let notice = fixture.notices.try_recv().expect("one info notice");
        assert_eq!(notice.level, NoticeLevel::Info);
        assert!(fixture.notices.try_recv().is_err(), "no redelivery");
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_and_unsubscribe_is_too() {
        let (backend, _list_id) = seeded_backend().await;
        let fixture = channel_for(backend, "bob");

        fixture.channel.subscribe().await.expect("first subscribe");
        fixture.channel.subscribe().await.expect("second subscribe");
        fixture.channel.unsubscribe();
        fixture.channel.unsubscribe();
    }

    #[tokio::test]
    async fn accept_runs_the_cascade() {
        let (backend, list_id) = seeded_backend().await;
        backend
            .insert_invitation(&list_id, "alice", "bob")
            .await
            .expect("invite");

        let fixture = channel_for(backend, "bob");
        let pending = fixture.channel.refresh_pending().await.expect("refresh");
        fixture.channel.accept(&pending[0].id).await.expect("accept");

        assert_eq!(fixture.channel.pending_count(), 0);
        assert_eq!(fixture.selection.active(), Some(list_id));
    }

    #[tokio::test]
    async fn accept_all_reports_partial_failure_and_keeps_successes() {
        let (backend, list_id) = seeded_backend().await;
        backend.add_user("carol", "Carol", "", "carol", "");
        backend.add_user("dave", "Dave", "", "dave", "");
        let second = backend
            .create_list(NewList {
                name: "Work".to_string(),
                kind: ListKind::Task,
                created_by: "carol".to_string(),
            })
            .await
            .expect("create list");
        let third = backend
            .create_list(NewList {
                name: "Trip".to_string(),
                kind: ListKind::Note,
                created_by: "dave".to_string(),
            })
            .await
            .expect("create list");

        backend.insert_invitation(&list_id, "alice", "bob").await.expect("i1");
        backend.insert_invitation(&second.id, "carol", "bob").await.expect("i2");
        backend.insert_invitation(&third.id, "dave", "bob").await.expect("i3");

        let fixture = channel_for(backend.clone(), "bob");
        fixture.channel.refresh_pending().await.expect("refresh");

        backend.fail_next("accept_invitation");
        let failures = fixture.channel.accept_all().await.expect("accept all");

        assert_eq!(failures, 1);
        assert_eq!(fixture.channel.pending_count(), 1, "failed invite stays cached");

        // Two memberships exist despite the one failure.
        let joined = backend.memberships_for("bob").await.expect("memberships");
        assert_eq!(joined.len(), 2);
    }

    #[tokio::test]
    async fn accept_all_activates_the_newest_accepted_list() {
        let (backend, list_id) = seeded_backend().await;
        backend.add_user("carol", "Carol", "", "carol", "");
        let second = backend
            .create_list(NewList {
                name: "Work".to_string(),
                kind: ListKind::Task,
                created_by: "carol".to_string(),
            })
            .await
            .expect("create list");

        backend.insert_invitation(&list_id, "alice", "bob").await.expect("older");
        backend.insert_invitation(&second.id, "carol", "bob").await.expect("newer");

        let fixture = channel_for(backend, "bob");
        fixture.channel.refresh_pending().await.expect("refresh");
        let failures = fixture.channel.accept_all().await.expect("accept all");

        assert_eq!(failures, 0);
        assert_eq!(fixture.selection.active(), Some(second.id));
    }
}
