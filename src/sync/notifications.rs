//! A user's notification feed, enriched with the invitation, list and
//! inviter each entry points at.
//!
//! Any of those references may be gone by the time the feed loads, so
//! every enrichment field is optional and a failed lookup only blanks it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::errors::{Error, Result};
use crate::gateway::{Gateway, GatewayResult, Subscription};
use crate::models::{
    invitation::{AcceptOutcome, Invitation, InvitationRef, InvitationStatus, RejectOutcome},
    list::List,
    notification::{EnrichedNotification, Notification},
    user::Account,
};
use crate::services::invitation::{accept_invitation, reject_invitation};
use crate::session::CurrentUser;

const UNKNOWN_INVITER: &str = "Someone";
const UNKNOWN_LIST: &str = "a list";

/// Terminal invitation statuses this process has observed. Views handed the
/// same instance never show a settled invitation as pending again, whatever
/// a later read returns.
#[derive(Debug, Clone, Default)]
pub struct SettledInvitations(Arc<RwLock<HashMap<String, InvitationStatus>>>);

impl SettledInvitations {
    /// Keeps the first terminal status seen. `pending` is ignored.
    pub async fn record(&self, invitation_id: &str, status: InvitationStatus) {
        if status.is_terminal() {
            self.0
                .write()
                .await
                .entry(invitation_id.to_string())
                .or_insert(status);
        }
    }

    pub async fn get(&self, invitation_id: &str) -> Option<InvitationStatus> {
        self.0.read().await.get(invitation_id).copied()
    }
}

pub struct NotificationView {
    gateway: Arc<dyn Gateway>,
    user: CurrentUser,
    items: Vec<EnrichedNotification>,
    unread: usize,
    settled: SettledInvitations,
    surface_open: bool,
    feed: Option<Subscription<Notification>>,
}

fn keyed<T>(found: GatewayResult<Vec<T>>, what: &str, key: impl Fn(&T) -> String) -> HashMap<String, T> {
    match found {
        Ok(rows) => rows.into_iter().map(|row| (key(&row), row)).collect(),
        Err(error) => {
            warn!(%error, what, "enrichment lookup failed");
            HashMap::new()
        }
    }
}

impl NotificationView {
    pub fn new(gateway: Arc<dyn Gateway>, user: CurrentUser) -> Self {
        Self {
            gateway,
            user,
            items: Vec::new(),
            unread: 0,
            settled: SettledInvitations::default(),
            surface_open: false,
            feed: None,
        }
    }

    /// Shares settled statuses with other views of the same process.
    pub fn sharing(mut self, settled: SettledInvitations) -> Self {
        self.settled = settled;
        self
    }

    pub fn items(&self) -> &[EnrichedNotification] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn is_open(&self) -> bool {
        self.surface_open
    }

    pub fn open_surface(&mut self) {
        self.surface_open = true;
    }

    pub fn close_surface(&mut self) {
        self.surface_open = false;
    }

    pub async fn load(&mut self) -> Result<()> {
        let notifications = self.gateway.notifications_for_user(&self.user.id).await?;

        let mut invitation_ids = BTreeSet::new();
        let mut list_ids = BTreeSet::new();
        let mut inviter_ids = BTreeSet::new();
        for refs in notifications.iter().filter_map(Notification::invitation_refs) {
            invitation_ids.extend(refs.invitation_id);
            list_ids.extend(refs.list_id);
            inviter_ids.extend(refs.invited_by);
        }

        let mut invitations: HashMap<String, Invitation> = if invitation_ids.is_empty() {
            HashMap::new()
        } else {
            let ids: Vec<String> = invitation_ids.into_iter().collect();
            keyed(self.gateway.invitations_by_ids(&ids).await, "invitations", |i: &Invitation| i.id.clone())
        };
        let lists: HashMap<String, List> = if list_ids.is_empty() {
            HashMap::new()
        } else {
            let ids: Vec<String> = list_ids.into_iter().collect();
            keyed(self.gateway.lists_by_ids(&ids).await, "lists", |l: &List| l.id.clone())
        };
        let inviters: HashMap<String, Account> = if inviter_ids.is_empty() {
            HashMap::new()
        } else {
            let ids: Vec<String> = inviter_ids.into_iter().collect();
            keyed(self.gateway.accounts_by_ids(&ids).await, "accounts", |a: &Account| a.id.clone())
        };

        for invitation in invitations.values_mut() {
            self.settled.record(&invitation.id, invitation.status).await;
            if let Some(status) = self.settled.get(&invitation.id).await {
                invitation.status = status;
            }
        }

        self.items = notifications
            .into_iter()
            .map(|notification| {
                let refs = notification.invitation_refs().unwrap_or_default();
                EnrichedNotification {
                    invitation: refs
                        .invitation_id
                        .as_ref()
                        .and_then(|id| invitations.get(id))
                        .cloned(),
                    list_title: refs
                        .list_id
                        .as_ref()
                        .and_then(|id| lists.get(id))
                        .map(|l| l.title.clone()),
                    inviter_name: refs
                        .invited_by
                        .as_ref()
                        .and_then(|id| inviters.get(id))
                        .map(Account::display_name),
                    notification,
                }
            })
            .collect();

        self.unread = self.items.iter().filter(|n| !n.notification.read).count();
        debug!(user_id = %self.user.id, items = self.items.len(), unread = self.unread, "notifications loaded");
        Ok(())
    }

    /// Starts listening for new notifications of this user.
    pub async fn watch(&mut self) -> Result<()> {
        self.feed = Some(self.gateway.subscribe_notifications(&self.user.id).await?);
        Ok(())
    }

    pub fn unwatch(&mut self) {
        self.feed = None;
    }

    /// Waits for the next insert and reloads. `Ok(false)` once the feed is
    /// gone.
    pub async fn next_change(&mut self) -> Result<bool> {
        let Some(feed) = self.feed.as_mut() else {
            return Ok(false);
        };
        match feed.recv().await {
            Some(inserted) => {
                debug!(notification_id = %inserted.id, "notification pushed");
                self.load().await?;
                Ok(true)
            }
            None => {
                self.feed = None;
                Ok(false)
            }
        }
    }

    fn invitation_id_of(&self, notification_id: &str) -> Result<String> {
        self.items
            .iter()
            .find(|n| n.notification.id == notification_id)
            .ok_or(Error::NotFound)?
            .notification
            .invitation_refs()
            .and_then(|refs| refs.invitation_id)
            .ok_or_else(|| Error::InvalidInput("notification carries no invitation".into()))
    }

    pub async fn handle_accept_invitation(&mut self, notification_id: &str) -> Result<AcceptOutcome> {
        self.close_surface();
        let invitation_id = self.invitation_id_of(notification_id)?;

        let outcome = accept_invitation(
            self.gateway.as_ref(),
            InvitationRef::Id(invitation_id.clone()),
            &self.user,
        )
        .await?;

        if outcome.success {
            self.settle(notification_id, &invitation_id, InvitationStatus::Accepted)
                .await;
            info!(notification_id, %invitation_id, "invitation accepted from notification");
        }
        Ok(outcome)
    }

    /// Rejects through the lifecycle service, which re-reads the stored
    /// status and refuses an invitation that is already accepted.
    pub async fn handle_reject_invitation(&mut self, notification_id: &str) -> Result<RejectOutcome> {
        self.close_surface();
        let invitation_id = self.invitation_id_of(notification_id)?;

        if self.settled.get(&invitation_id).await == Some(InvitationStatus::Accepted) {
            return Err(Error::InvitationClosed);
        }

        let outcome = reject_invitation(self.gateway.as_ref(), &invitation_id, &self.user).await?;

        if outcome.success {
            self.settle(notification_id, &invitation_id, InvitationStatus::Rejected)
                .await;
            info!(notification_id, %invitation_id, "invitation rejected from notification");
        }
        Ok(outcome)
    }

    pub async fn mark_read(&mut self, notification_id: &str) -> Result<()> {
        self.gateway
            .mark_notifications_read(&[notification_id.to_string()])
            .await?;
        self.mark_read_locally(notification_id);
        Ok(())
    }

    fn mark_read_locally(&mut self, notification_id: &str) {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|n| n.notification.id == notification_id)
        {
            if !item.notification.read {
                item.notification.read = true;
                self.unread = self.unread.saturating_sub(1);
            }
        }
    }

    async fn settle(&mut self, notification_id: &str, invitation_id: &str, status: InvitationStatus) {
        self.apply_invitation_status(invitation_id, status).await;
        self.mark_read_locally(notification_id);
    }

    /// Merges a known invitation status. A terminal status is never walked
    /// back to `pending`.
    pub async fn apply_invitation_status(&mut self, invitation_id: &str, status: InvitationStatus) {
        self.settled.record(invitation_id, status).await;
        let status = self.settled.get(invitation_id).await.unwrap_or(status);
        for invitation in self
            .items
            .iter_mut()
            .filter_map(|n| n.invitation.as_mut())
            .filter(|i| i.id == invitation_id)
        {
            if !invitation.status.is_terminal() {
                invitation.status = status;
            }
        }
    }

    /// Only a pending invitation offers accept and reject.
    pub fn is_actionable(&self, item: &EnrichedNotification) -> bool {
        item.invitation
            .as_ref()
            .is_some_and(|i| i.status == InvitationStatus::Pending)
    }

    pub fn summary(&self, item: &EnrichedNotification) -> String {
        let inviter = item.inviter_name.as_deref().unwrap_or(UNKNOWN_INVITER);
        let list = item.list_title.as_deref().unwrap_or(UNKNOWN_LIST);
        format!("{inviter} invited you to {list}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::MemoryGateway;
    use crate::models::user::CreateAccount;
    use crate::services::{invitation::create_invitation, lists::create_list};
    use crate::utils::time::time_now;

    struct World {
        gw: Arc<MemoryGateway>,
        bob: CurrentUser,
        lists: Vec<String>,
    }

    async fn world(invites: usize) -> World {
        let gw = Arc::new(MemoryGateway::new());
        let account = |email: &str| CreateAccount {
            email: email.into(),
            password_hash: String::new(),
            created_at: time_now(),
        };
        let alice = gw.create_account(account("alice@example.com")).await.unwrap();
        let bob = gw.create_account(account("bob@example.com")).await.unwrap();

        let mut lists = Vec::new();
        for n in 0..invites {
            let list = create_list(gw.as_ref(), &format!("L{n}"), "", &alice.id)
                .await
                .unwrap();
            create_invitation(gw.as_ref(), "http://app", &list.id, &bob.email, &alice.id)
                .await
                .unwrap();
            lists.push(list.id);
        }
        World {
            gw,
            bob: CurrentUser {
                id: bob.id,
                email: bob.email,
                session_id: "s1".into(),
            },
            lists,
        }
    }

    #[tokio::test]
    async fn test_load_batches_one_lookup_per_collection() {
        let w = world(3).await;
        let mut view = NotificationView::new(w.gw.clone(), w.bob.clone());
        view.load().await.unwrap();

        assert_eq!(view.items().len(), 3);
        assert_eq!(view.unread_count(), 3);
        assert_eq!(w.gw.calls("invitations_by_ids").await, 1);
        assert_eq!(w.gw.calls("lists_by_ids").await, 1);
        assert_eq!(w.gw.calls("accounts_by_ids").await, 1);

        let first = &view.items()[0];
        assert!(view.is_actionable(first));
        assert_eq!(view.summary(first), "alice invited you to L2");
    }

    #[tokio::test]
    async fn test_missing_references_fall_back() {
        let w = world(1).await;
        w.gw.remove_list_row(&w.lists[0]).await;
        w.gw.fail_on("accounts_by_ids").await;

        let mut view = NotificationView::new(w.gw.clone(), w.bob.clone());
        view.load().await.unwrap();

        let item = &view.items()[0];
        assert!(item.list_title.is_none());
        assert!(item.inviter_name.is_none());
        assert!(item.invitation.is_some());
        assert_eq!(view.summary(item), "Someone invited you to a list");
    }

    #[tokio::test]
    async fn test_accept_settles_locally_and_never_regresses() {
        let w = world(1).await;
        let mut view = NotificationView::new(w.gw.clone(), w.bob.clone());
        view.load().await.unwrap();
        view.open_surface();
        let id = view.items()[0].notification.id.clone();

        let outcome = view.handle_accept_invitation(&id).await.unwrap();
        assert!(outcome.success);
        assert!(!view.is_open());
        assert_eq!(view.unread_count(), 0);
        assert!(!view.is_actionable(&view.items()[0]));

        let invitation_id = view.items()[0].invitation.as_ref().unwrap().id.clone();
        view.apply_invitation_status(&invitation_id, InvitationStatus::Pending)
            .await;
        assert_eq!(
            view.items()[0].invitation.as_ref().unwrap().status,
            InvitationStatus::Accepted
        );
    }

    #[tokio::test]
    async fn test_local_terminal_status_beats_a_stale_fetch() {
        let w = world(1).await;
        let mut view = NotificationView::new(w.gw.clone(), w.bob.clone());
        view.load().await.unwrap();
        let invitation_id = view.items()[0].invitation.as_ref().unwrap().id.clone();

        view.apply_invitation_status(&invitation_id, InvitationStatus::Rejected)
            .await;
        view.load().await.unwrap();
        assert_eq!(
            view.items()[0].invitation.as_ref().unwrap().status,
            InvitationStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_failed_accept_leaves_state_untouched() {
        let w = world(1).await;
        let mut view = NotificationView::new(w.gw.clone(), w.bob.clone());
        view.load().await.unwrap();
        let id = view.items()[0].notification.id.clone();

        w.gw.fail_on("set_invitation_status").await;
        assert!(view.handle_accept_invitation(&id).await.is_err());
        assert_eq!(view.unread_count(), 1);
        assert!(view.is_actionable(&view.items()[0]));
    }

    #[tokio::test]
    async fn test_reject_and_mark_read() {
        let w = world(2).await;
        let mut view = NotificationView::new(w.gw.clone(), w.bob.clone());
        view.load().await.unwrap();
        let first = view.items()[0].notification.id.clone();
        let second = view.items()[1].notification.id.clone();

        view.handle_reject_invitation(&first).await.unwrap();
        assert_eq!(
            view.items()[0].invitation.as_ref().unwrap().status,
            InvitationStatus::Rejected
        );
        assert_eq!(view.unread_count(), 1);

        view.mark_read(&second).await.unwrap();
        view.mark_read(&second).await.unwrap();
        assert_eq!(view.unread_count(), 0);

        view.load().await.unwrap();
        assert_eq!(view.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_push_triggers_reload() {
        let w = world(0).await;
        let mut view = NotificationView::new(w.gw.clone(), w.bob.clone());
        view.load().await.unwrap();
        view.watch().await.unwrap();

        let alice = w.gw.account_by_email("alice@example.com").await.unwrap().unwrap();
        let list = create_list(w.gw.as_ref(), "Late", "", &alice.id).await.unwrap();
        create_invitation(w.gw.as_ref(), "http://app", &list.id, "bob@example.com", &alice.id)
            .await
            .unwrap();

        assert!(view.next_change().await.unwrap());
        assert_eq!(view.unread_count(), 1);

        view.unwatch();
        assert!(!view.next_change().await.unwrap());
    }

    fn invitation_of(view: &NotificationView) -> String {
        view.items()[0].invitation.as_ref().unwrap().id.clone()
    }

    fn status_of(view: &NotificationView) -> InvitationStatus {
        view.items()[0].invitation.as_ref().unwrap().status
    }

    #[tokio::test]
    async fn test_reject_is_refused_once_accepted() {
        let w = world(1).await;
        let mut view = NotificationView::new(w.gw.clone(), w.bob.clone());
        view.load().await.unwrap();
        let id = view.items()[0].notification.id.clone();
        let invitation_id = invitation_of(&view);

        // accepted elsewhere while this feed still shows it pending
        accept_invitation(w.gw.as_ref(), InvitationRef::Id(invitation_id.clone()), &w.bob)
            .await
            .unwrap();
        assert!(matches!(
            view.handle_reject_invitation(&id).await,
            Err(Error::InvitationClosed)
        ));

        view.load().await.unwrap();
        assert!(matches!(
            view.handle_reject_invitation(&id).await,
            Err(Error::InvitationClosed)
        ));
        let stored = w.gw.invitation_by_id(&invitation_id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvitationStatus::Accepted);
        assert_eq!(status_of(&view), InvitationStatus::Accepted);
        assert_eq!(w.gw.membership_count(&w.lists[0], &w.bob.id).await, 1);
    }

    #[tokio::test]
    async fn test_reject_survives_a_failed_read_marker() {
        let w = world(1).await;
        let mut view = NotificationView::new(w.gw.clone(), w.bob.clone());
        view.load().await.unwrap();
        let id = view.items()[0].notification.id.clone();
        let invitation_id = invitation_of(&view);

        w.gw.fail_on("mark_notifications_read").await;
        let outcome = view.handle_reject_invitation(&id).await.unwrap();
        assert!(outcome.success);

        let stored = w.gw.invitation_by_id(&invitation_id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvitationStatus::Rejected);
        assert!(!view.is_actionable(&view.items()[0]));
        assert_eq!(view.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_fetched_terminal_status_never_regresses() {
        let w = world(1).await;
        let mut view = NotificationView::new(w.gw.clone(), w.bob.clone());
        view.load().await.unwrap();
        let invitation_id = invitation_of(&view);

        w.gw.set_invitation_status(&invitation_id, InvitationStatus::Accepted)
            .await
            .unwrap();
        view.load().await.unwrap();
        assert_eq!(status_of(&view), InvitationStatus::Accepted);

        // a lagging read
        w.gw.set_invitation_status(&invitation_id, InvitationStatus::Pending)
            .await
            .unwrap();
        view.load().await.unwrap();
        assert_eq!(status_of(&view), InvitationStatus::Accepted);
        assert!(!view.is_actionable(&view.items()[0]));
    }

    #[tokio::test]
    async fn test_settled_statuses_are_shared_between_views() {
        let w = world(1).await;
        let settled = SettledInvitations::default();
        let mut first = NotificationView::new(w.gw.clone(), w.bob.clone()).sharing(settled.clone());
        first.load().await.unwrap();
        let id = first.items()[0].notification.id.clone();
        let invitation_id = invitation_of(&first);
        first.handle_accept_invitation(&id).await.unwrap();

        w.gw.set_invitation_status(&invitation_id, InvitationStatus::Pending)
            .await
            .unwrap();
        let mut second = NotificationView::new(w.gw.clone(), w.bob.clone()).sharing(settled);
        second.load().await.unwrap();
        assert_eq!(status_of(&second), InvitationStatus::Accepted);

        let mut isolated = NotificationView::new(w.gw.clone(), w.bob.clone());
        isolated.load().await.unwrap();
        assert_eq!(status_of(&isolated), InvitationStatus::Pending);
    }
}
