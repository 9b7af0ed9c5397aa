//! Typed access to the external data platform.
//!
//! Every call returns `GatewayResult<T>`; callers decide per call whether a
//! failure ends the user flow or is only logged.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    invitation::{CreateInvitation, Invitation, InvitationStatus},
    list::{CreateList, CreateListMembership, List, ListMembership, MembershipWithList},
    notification::{CreateNotification, Notification},
    subscription::{SubscriptionPatch, UserSubscription},
    task::{CreateTask, Task, TaskChange, TaskPatch},
    user::{Account, CreateAccount},
};

pub mod memory;
pub mod subscription;
pub mod surreal;

pub use subscription::Subscription;

pub type GatewayResult<T> = core::result::Result<T, GatewayError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("platform error: {0}")]
    Platform(String),
    #[error("record not found")]
    NotFound,
    #[error("conflict on {0}")]
    Conflict(String),
    #[error("could not decode platform response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait Gateway: Send + Sync {
    // ! accounts
    async fn create_account(&self, input: CreateAccount) -> GatewayResult<Account>;
    async fn account_by_email(&self, email: &str) -> GatewayResult<Option<Account>>;
    async fn accounts_by_ids(&self, ids: &[String]) -> GatewayResult<Vec<Account>>;

    // ! lists
    /// Creates the list and its `owner` membership together.
    async fn create_list_with_owner(&self, input: CreateList) -> GatewayResult<List>;
    async fn list_by_id(&self, list_id: &str) -> GatewayResult<Option<List>>;
    async fn lists_by_ids(&self, ids: &[String]) -> GatewayResult<Vec<List>>;
    /// Membership rows for `user_id` joined with their list, newest list first.
    async fn memberships_with_lists(&self, user_id: &str)
    -> GatewayResult<Vec<MembershipWithList>>;
    /// Removes tasks, memberships, invitations and then the list itself.
    async fn delete_list_cascade(&self, list_id: &str) -> GatewayResult<()>;

    // ! memberships
    async fn find_membership(
        &self,
        list_id: &str,
        user_id: &str,
    ) -> GatewayResult<Option<ListMembership>>;
    /// Every membership of one list, oldest first.
    async fn memberships_of_list(&self, list_id: &str) -> GatewayResult<Vec<ListMembership>>;
    /// Fails with `Conflict` when `(list_id, user_id)` already exists.
    async fn insert_membership(&self, input: CreateListMembership)
    -> GatewayResult<ListMembership>;

    // ! tasks
    async fn create_task(&self, input: CreateTask) -> GatewayResult<Task>;
    async fn task_by_id(&self, task_id: &str) -> GatewayResult<Option<Task>>;
    /// Newest first.
    async fn tasks_for_list(&self, list_id: &str) -> GatewayResult<Vec<Task>>;
    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> GatewayResult<Task>;
    async fn delete_task(&self, task_id: &str) -> GatewayResult<()>;
    async fn subscribe_tasks(&self, list_id: &str) -> GatewayResult<Subscription<TaskChange>>;

    // ! invitations
    async fn create_invitation(&self, input: CreateInvitation) -> GatewayResult<Invitation>;
    async fn invitation_by_id(&self, invitation_id: &str) -> GatewayResult<Option<Invitation>>;
    async fn invitation_by_token_hash(&self, token_hash: &str)
    -> GatewayResult<Option<Invitation>>;
    async fn invitations_by_ids(&self, ids: &[String]) -> GatewayResult<Vec<Invitation>>;
    async fn set_invitation_status(
        &self,
        invitation_id: &str,
        status: InvitationStatus,
    ) -> GatewayResult<Invitation>;

    // ! notifications
    async fn create_notification(&self, input: CreateNotification) -> GatewayResult<Notification>;
    /// Newest first.
    async fn notifications_for_user(&self, user_id: &str) -> GatewayResult<Vec<Notification>>;
    /// `list_invitation` notifications of `user_id` pointing at `invitation_id`.
    async fn notifications_for_invitation(
        &self,
        user_id: &str,
        invitation_id: &str,
    ) -> GatewayResult<Vec<Notification>>;
    async fn mark_notifications_read(&self, ids: &[String]) -> GatewayResult<()>;
    /// Insert events for one user's notifications.
    async fn subscribe_notifications(
        &self,
        user_id: &str,
    ) -> GatewayResult<Subscription<Notification>>;

    // ! billing
    async fn subscription_for_user(&self, user_id: &str)
    -> GatewayResult<Option<UserSubscription>>;
    async fn upsert_subscription(&self, sub: UserSubscription) -> GatewayResult<UserSubscription>;
    /// `None` when no record carries `customer_id`.
    async fn update_subscription_by_customer(
        &self,
        customer_id: &str,
        patch: SubscriptionPatch,
    ) -> GatewayResult<Option<UserSubscription>>;
}
