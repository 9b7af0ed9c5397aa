//! In-process platform with the same contract as the SurrealDB gateway.
//! Backs tests and `PLATFORM_BACKEND=memory` local runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, future::ready, stream};
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use crate::gateway::{Gateway, GatewayError, GatewayResult, Subscription};
use crate::models::{
    invitation::{CreateInvitation, Invitation, InvitationStatus},
    list::{CreateList, CreateListMembership, List, ListMembership, ListRole, MembershipWithList},
    notification::{CreateNotification, Notification},
    subscription::{SubscriptionPatch, UserSubscription},
    task::{CreateTask, Task, TaskChange, TaskPatch},
    user::{Account, CreateAccount},
};

const EVENT_CAPACITY: usize = 256;

#[derive(Default)]
struct Tables {
    accounts: Vec<Account>,
    lists: Vec<List>,
    members: Vec<ListMembership>,
    tasks: Vec<Task>,
    invitations: Vec<Invitation>,
    notifications: Vec<Notification>,
    subscriptions: Vec<UserSubscription>,
}

pub struct MemoryGateway {
    tables: Mutex<Tables>,
    task_events: broadcast::Sender<TaskChange>,
    notification_events: broadcast::Sender<Notification>,
    failing: Mutex<HashSet<&'static str>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        let (task_events, _) = broadcast::channel(EVENT_CAPACITY);
        let (notification_events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tables: Mutex::new(Tables::default()),
            task_events,
            notification_events,
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Newest first; among equal timestamps the later insert wins.
fn newest_first<T: Clone>(rows: impl DoubleEndedIterator<Item = T>, at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut rows: Vec<T> = rows.rev().collect();
    rows.sort_by_key(|row| std::cmp::Reverse(at(row)));
    rows
}

fn live<T, F>(rx: broadcast::Receiver<T>, keep: F) -> Subscription<T>
where
    T: Clone + Send + 'static,
    F: Fn(&T) -> bool + Send + 'static,
{
    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((event, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "memory live feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Subscription::forward(events.filter(move |event| ready(keep(event))))
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `op` fail with a platform error.
    pub async fn fail_on(&self, op: &'static str) {
        self.failing.lock().await.insert(op);
    }

    pub async fn recover(&self, op: &'static str) {
        self.failing.lock().await.remove(op);
    }

    /// How many times `op` has been called.
    pub async fn calls(&self, op: &'static str) -> usize {
        self.calls.lock().await.get(op).copied().unwrap_or(0)
    }

    pub async fn membership_count(&self, list_id: &str, user_id: &str) -> usize {
        self.tables
            .lock()
            .await
            .members
            .iter()
            .filter(|m| m.list_id == list_id && m.user_id == user_id)
            .count()
    }

    /// Drops only the list row, leaving dangling references behind.
    pub async fn remove_list_row(&self, list_id: &str) {
        self.tables.lock().await.lists.retain(|l| l.id != list_id);
    }

    pub async fn invitation_count(&self) -> usize {
        self.tables.lock().await.invitations.len()
    }

    pub async fn subscription_rows(&self) -> Vec<UserSubscription> {
        self.tables.lock().await.subscriptions.clone()
    }

    async fn enter(&self, op: &'static str) -> GatewayResult<()> {
        *self.calls.lock().await.entry(op).or_default() += 1;
        if self.failing.lock().await.contains(op) {
            return Err(GatewayError::Platform(format!("injected failure in {op}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn create_account(&self, input: CreateAccount) -> GatewayResult<Account> {
        self.enter("create_account").await?;
        let mut tables = self.tables.lock().await;
        if tables.accounts.iter().any(|a| a.email == input.email) {
            return Err(GatewayError::Conflict(format!("users.email {}", input.email)));
        }
        let account = Account {
            id: new_id(),
            email: input.email,
            password_hash: input.password_hash,
            created_at: input.created_at,
        };
        tables.accounts.push(account.clone());
        Ok(account)
    }

    async fn account_by_email(&self, email: &str) -> GatewayResult<Option<Account>> {
        self.enter("account_by_email").await?;
        let tables = self.tables.lock().await;
        Ok(tables.accounts.iter().find(|a| a.email == email).cloned())
    }

    async fn accounts_by_ids(&self, ids: &[String]) -> GatewayResult<Vec<Account>> {
        self.enter("accounts_by_ids").await?;
        let tables = self.tables.lock().await;
        Ok(tables
            .accounts
            .iter()
            .filter(|a| ids.contains(&a.id))
            .cloned()
            .collect())
    }

    async fn create_list_with_owner(&self, input: CreateList) -> GatewayResult<List> {
        self.enter("create_list_with_owner").await?;
        let mut tables = self.tables.lock().await;
        let list = List {
            id: new_id(),
            title: input.title,
            description: input.description,
            owner_id: input.owner_id.clone(),
            created_at: input.created_at,
            updated_at: None,
        };
        tables.members.push(ListMembership {
            id: new_id(),
            list_id: list.id.clone(),
            user_id: input.owner_id,
            role: ListRole::Owner,
            created_at: input.created_at,
        });
        tables.lists.push(list.clone());
        Ok(list)
    }

    async fn list_by_id(&self, list_id: &str) -> GatewayResult<Option<List>> {
        self.enter("list_by_id").await?;
        let tables = self.tables.lock().await;
        Ok(tables.lists.iter().find(|l| l.id == list_id).cloned())
    }

    async fn lists_by_ids(&self, ids: &[String]) -> GatewayResult<Vec<List>> {
        self.enter("lists_by_ids").await?;
        let tables = self.tables.lock().await;
        Ok(tables
            .lists
            .iter()
            .filter(|l| ids.contains(&l.id))
            .cloned()
            .collect())
    }

    async fn memberships_with_lists(
        &self,
        user_id: &str,
    ) -> GatewayResult<Vec<MembershipWithList>> {
        self.enter("memberships_with_lists").await?;
        let tables = self.tables.lock().await;
        let mut rows: Vec<MembershipWithList> = tables
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| MembershipWithList {
                list_id: m.list_id.clone(),
                role: m.role,
                list: tables.lists.iter().find(|l| l.id == m.list_id).cloned(),
            })
            .collect();
        rows.sort_by_key(|row| std::cmp::Reverse(row.list.as_ref().map(|l| l.created_at)));
        Ok(rows)
    }

    async fn delete_list_cascade(&self, list_id: &str) -> GatewayResult<()> {
        self.enter("delete_list_cascade").await?;
        let mut tables = self.tables.lock().await;
        let removed: Vec<Task> = tables
            .tasks
            .iter()
            .filter(|t| t.list_id == list_id)
            .cloned()
            .collect();
        tables.tasks.retain(|t| t.list_id != list_id);
        tables.members.retain(|m| m.list_id != list_id);
        tables.invitations.retain(|i| i.list_id != list_id);
        tables.lists.retain(|l| l.id != list_id);
        drop(tables);
        for task in removed {
            let _ = self.task_events.send(TaskChange::Delete(task));
        }
        Ok(())
    }

    async fn find_membership(
        &self,
        list_id: &str,
        user_id: &str,
    ) -> GatewayResult<Option<ListMembership>> {
        self.enter("find_membership").await?;
        let tables = self.tables.lock().await;
        Ok(tables
            .members
            .iter()
            .find(|m| m.list_id == list_id && m.user_id == user_id)
            .cloned())
    }

    async fn memberships_of_list(&self, list_id: &str) -> GatewayResult<Vec<ListMembership>> {
        self.enter("memberships_of_list").await?;
        let tables = self.tables.lock().await;
        Ok(tables
            .members
            .iter()
            .filter(|m| m.list_id == list_id)
            .cloned()
            .collect())
    }

    async fn insert_membership(
        &self,
        input: CreateListMembership,
    ) -> GatewayResult<ListMembership> {
        self.enter("insert_membership").await?;
        let mut tables = self.tables.lock().await;
        if tables
            .members
            .iter()
            .any(|m| m.list_id == input.list_id && m.user_id == input.user_id)
        {
            return Err(GatewayError::Conflict(format!(
                "list_members ({}, {})",
                input.list_id, input.user_id
            )));
        }
        let membership = ListMembership {
            id: new_id(),
            list_id: input.list_id,
            user_id: input.user_id,
            role: input.role,
            created_at: input.created_at,
        };
        tables.members.push(membership.clone());
        Ok(membership)
    }

    async fn create_task(&self, input: CreateTask) -> GatewayResult<Task> {
        self.enter("create_task").await?;
        let task = Task {
            id: new_id(),
            list_id: input.list_id,
            title: input.title,
            description: input.description,
            completed: input.completed,
            completed_at: None,
            completed_by: None,
            created_by: input.created_by,
            created_at: input.created_at,
        };
        self.tables.lock().await.tasks.push(task.clone());
        let _ = self.task_events.send(TaskChange::Insert(task.clone()));
        Ok(task)
    }

    async fn task_by_id(&self, task_id: &str) -> GatewayResult<Option<Task>> {
        self.enter("task_by_id").await?;
        let tables = self.tables.lock().await;
        Ok(tables.tasks.iter().find(|t| t.id == task_id).cloned())
    }

    async fn tasks_for_list(&self, list_id: &str) -> GatewayResult<Vec<Task>> {
        self.enter("tasks_for_list").await?;
        let tables = self.tables.lock().await;
        Ok(newest_first(
            tables.tasks.iter().filter(|t| t.list_id == list_id).cloned(),
            |t| t.created_at,
        ))
    }

    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> GatewayResult<Task> {
        self.enter("update_task").await?;
        let mut tables = self.tables.lock().await;
        let task = tables
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(GatewayError::NotFound)?;
        patch.apply(task);
        let task = task.clone();
        drop(tables);
        let _ = self.task_events.send(TaskChange::Update(task.clone()));
        Ok(task)
    }

    async fn delete_task(&self, task_id: &str) -> GatewayResult<()> {
        self.enter("delete_task").await?;
        let mut tables = self.tables.lock().await;
        let Some(pos) = tables.tasks.iter().position(|t| t.id == task_id) else {
            return Ok(());
        };
        let task = tables.tasks.remove(pos);
        drop(tables);
        let _ = self.task_events.send(TaskChange::Delete(task));
        Ok(())
    }

    async fn subscribe_tasks(&self, list_id: &str) -> GatewayResult<Subscription<TaskChange>> {
        self.enter("subscribe_tasks").await?;
        let list_id = list_id.to_string();
        Ok(live(self.task_events.subscribe(), move |change| {
            let task = match change {
                TaskChange::Insert(t) | TaskChange::Update(t) | TaskChange::Delete(t) => t,
            };
            task.list_id == list_id
        }))
    }

    async fn create_invitation(&self, input: CreateInvitation) -> GatewayResult<Invitation> {
        self.enter("create_invitation").await?;
        let invitation = Invitation {
            id: new_id(),
            list_id: input.list_id,
            invited_by: input.invited_by,
            email: input.email,
            token_hash: input.token_hash,
            status: input.status,
            created_at: input.created_at,
            expires_at: input.expires_at,
        };
        self.tables.lock().await.invitations.push(invitation.clone());
        Ok(invitation)
    }

    async fn invitation_by_id(&self, invitation_id: &str) -> GatewayResult<Option<Invitation>> {
        self.enter("invitation_by_id").await?;
        let tables = self.tables.lock().await;
        Ok(tables
            .invitations
            .iter()
            .find(|i| i.id == invitation_id)
            .cloned())
    }

    async fn invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> GatewayResult<Option<Invitation>> {
        self.enter("invitation_by_token_hash").await?;
        let tables = self.tables.lock().await;
        Ok(tables
            .invitations
            .iter()
            .find(|i| i.token_hash == token_hash)
            .cloned())
    }

    async fn invitations_by_ids(&self, ids: &[String]) -> GatewayResult<Vec<Invitation>> {
        self.enter("invitations_by_ids").await?;
        let tables = self.tables.lock().await;
        Ok(tables
            .invitations
            .iter()
            .filter(|i| ids.contains(&i.id))
            .cloned()
            .collect())
    }

    async fn set_invitation_status(
        &self,
        invitation_id: &str,
        status: InvitationStatus,
    ) -> GatewayResult<Invitation> {
        self.enter("set_invitation_status").await?;
        let mut tables = self.tables.lock().await;
        let invitation = tables
            .invitations
            .iter_mut()
            .find(|i| i.id == invitation_id)
            .ok_or(GatewayError::NotFound)?;
        invitation.status = status;
        Ok(invitation.clone())
    }

    async fn create_notification(&self, input: CreateNotification) -> GatewayResult<Notification> {
        self.enter("create_notification").await?;
        let notification = Notification {
            id: new_id(),
            user_id: input.user_id,
            kind: input.kind,
            data: input.data,
            read: input.read,
            created_at: input.created_at,
        };
        self.tables
            .lock()
            .await
            .notifications
            .push(notification.clone());
        let _ = self.notification_events.send(notification.clone());
        Ok(notification)
    }

    async fn notifications_for_user(&self, user_id: &str) -> GatewayResult<Vec<Notification>> {
        self.enter("notifications_for_user").await?;
        let tables = self.tables.lock().await;
        Ok(newest_first(
            tables
                .notifications
                .iter()
                .filter(|n| n.user_id == user_id)
                .cloned(),
            |n| n.created_at,
        ))
    }

    async fn notifications_for_invitation(
        &self,
        user_id: &str,
        invitation_id: &str,
    ) -> GatewayResult<Vec<Notification>> {
        self.enter("notifications_for_invitation").await?;
        let tables = self.tables.lock().await;
        Ok(tables
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && n.references_invitation(invitation_id))
            .cloned()
            .collect())
    }

    async fn mark_notifications_read(&self, ids: &[String]) -> GatewayResult<()> {
        self.enter("mark_notifications_read").await?;
        let mut tables = self.tables.lock().await;
        for notification in tables
            .notifications
            .iter_mut()
            .filter(|n| ids.contains(&n.id))
        {
            notification.read = true;
        }
        Ok(())
    }

    async fn subscribe_notifications(
        &self,
        user_id: &str,
    ) -> GatewayResult<Subscription<Notification>> {
        self.enter("subscribe_notifications").await?;
        let user_id = user_id.to_string();
        Ok(live(self.notification_events.subscribe(), move |n| {
            n.user_id == user_id
        }))
    }

    async fn subscription_for_user(
        &self,
        user_id: &str,
    ) -> GatewayResult<Option<UserSubscription>> {
        self.enter("subscription_for_user").await?;
        let tables = self.tables.lock().await;
        Ok(tables
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn upsert_subscription(&self, sub: UserSubscription) -> GatewayResult<UserSubscription> {
        self.enter("upsert_subscription").await?;
        let mut tables = self.tables.lock().await;
        match tables
            .subscriptions
            .iter()
            .position(|s| s.user_id == sub.user_id)
        {
            Some(pos) => tables.subscriptions[pos] = sub.clone(),
            None => tables.subscriptions.push(sub.clone()),
        }
        Ok(sub)
    }

    async fn update_subscription_by_customer(
        &self,
        customer_id: &str,
        patch: SubscriptionPatch,
    ) -> GatewayResult<Option<UserSubscription>> {
        self.enter("update_subscription_by_customer").await?;
        let mut tables = self.tables.lock().await;
        let Some(sub) = tables
            .subscriptions
            .iter_mut()
            .find(|s| s.customer_id.as_deref() == Some(customer_id))
        else {
            return Ok(None);
        };
        patch.apply(sub, Utc::now());
        Ok(Some(sub.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_list(owner: &str) -> CreateList {
        CreateList {
            title: "Groceries".to_string(),
            description: String::new(),
            owner_id: owner.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_membership_is_a_conflict() {
        let gw = MemoryGateway::new();
        let list = gw.create_list_with_owner(create_list("alice")).await.unwrap();
        let err = gw
            .insert_membership(CreateListMembership {
                list_id: list.id.clone(),
                user_id: "alice".to_string(),
                role: ListRole::Member,
                created_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));
        assert_eq!(gw.membership_count(&list.id, "alice").await, 1);
    }

    #[tokio::test]
    async fn test_task_feed_is_scoped_to_one_list() {
        let gw = MemoryGateway::new();
        let mut feed = gw.subscribe_tasks("l1").await.unwrap();
        for list_id in ["l2", "l1"] {
            gw.create_task(CreateTask {
                list_id: list_id.to_string(),
                title: format!("in {list_id}"),
                description: String::new(),
                completed: false,
                created_by: "alice".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        match feed.recv().await {
            Some(TaskChange::Insert(task)) => assert_eq!(task.list_id, "l1"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_injected_failure_surfaces_as_platform_error() {
        let gw = MemoryGateway::new();
        gw.fail_on("list_by_id").await;
        assert!(matches!(
            gw.list_by_id("x").await,
            Err(GatewayError::Platform(_))
        ));
        gw.recover("list_by_id").await;
        assert_eq!(gw.list_by_id("x").await, Ok(None));
        assert_eq!(gw.calls("list_by_id").await, 2);
    }
}
