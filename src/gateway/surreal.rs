use std::collections::HashMap;

use async_trait::async_trait;
use futures::{StreamExt, future::ready};
use serde::de::DeserializeOwned;
use surrealdb::{
    Action, Notification as Live, Surreal,
    engine::remote::ws::{Client, Ws},
    opt::auth::Root,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PlatformConfig;
use crate::consts::table_const::{
    ACCOUNT_TABLE, INVITATION_TABLE, LIST_MEMBER_TABLE, LIST_TABLE, NOTIFICATION_TABLE,
    SUBSCRIPTION_TABLE, TASK_TABLE,
};
use crate::gateway::{Gateway, GatewayError, GatewayResult, Subscription};
use crate::models::{
    invitation::{CreateInvitation, Invitation, InvitationStatus},
    list::{CreateList, CreateListMembership, List, ListMembership, ListRole, MembershipWithList},
    notification::{CreateNotification, Notification, NotificationKind},
    subscription::{SubscriptionPatch, UserSubscription},
    task::{CreateTask, Task, TaskChange, TaskPatch},
    user::{Account, CreateAccount},
};
use crate::utils::get_record_id::record_ids;

const SCHEMA: &str = "
DEFINE INDEX IF NOT EXISTS users_email ON TABLE users FIELDS email UNIQUE;
DEFINE INDEX IF NOT EXISTS list_members_pair ON TABLE list_members FIELDS list_id, user_id UNIQUE;
DEFINE INDEX IF NOT EXISTS invitations_token ON TABLE invitations FIELDS token_hash UNIQUE;
DEFINE INDEX IF NOT EXISTS user_subscriptions_user ON TABLE user_subscriptions FIELDS user_id UNIQUE;
";

// ? every read projects the record key as a plain string id
const SELECT_ROW: &str = "SELECT *, meta::id(id) AS id, <datetime> created_at AS sort_at";

impl From<surrealdb::Error> for GatewayError {
    fn from(error: surrealdb::Error) -> Self {
        let message = error.to_string();
        if message.contains("already contains") {
            GatewayError::Conflict(message)
        } else {
            GatewayError::Platform(message)
        }
    }
}

fn decode(error: surrealdb::Error) -> GatewayError {
    GatewayError::Decode(error.to_string())
}

#[derive(Debug, Clone)]
pub struct SurrealGateway {
    sdb: Surreal<Client>,
}

fn new_key() -> String {
    Uuid::new_v4().simple().to_string()
}

impl SurrealGateway {
    pub async fn connect(config: &PlatformConfig) -> GatewayResult<Self> {
        let sdb = Surreal::new::<Ws>(config.url.as_str()).await?;
        sdb.signin(Root {
            username: &config.user,
            password: &config.password,
        })
        .await?;
        sdb.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await?;
        sdb.query(SCHEMA).await?.check()?;
        info!(url = %config.url, "connected to data platform");

        Ok(Self { sdb })
    }

    async fn create_row<C>(&self, table: &'static str, key: &str, content: C) -> GatewayResult<()>
    where
        C: serde::Serialize + 'static,
    {
        self.sdb
            .query("CREATE type::thing($table, $key) CONTENT $content RETURN NONE;")
            .bind(("table", table))
            .bind(("key", key.to_string()))
            .bind(("content", content))
            .await?
            .check()?;
        Ok(())
    }

    async fn by_key<T: DeserializeOwned>(
        &self,
        table: &'static str,
        key: &str,
    ) -> GatewayResult<Option<T>> {
        Ok(self.by_keys(table, &[key.to_string()]).await?.into_iter().next())
    }

    async fn by_keys<T: DeserializeOwned>(
        &self,
        table: &'static str,
        keys: &[String],
    ) -> GatewayResult<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .sdb
            .query(format!("{SELECT_ROW} FROM $things;"))
            .bind(("things", record_ids(table, keys)))
            .await?
            .take::<Vec<T>>(0)
            .map_err(decode)?;
        Ok(rows)
    }

    async fn where_eq<T: DeserializeOwned>(
        &self,
        table: &'static str,
        field: &'static str,
        value: String,
    ) -> GatewayResult<Vec<T>> {
        let rows = self
            .sdb
            .query(format!(
                "{SELECT_ROW} FROM type::table($table) WHERE {field} = $value ORDER BY sort_at DESC;"
            ))
            .bind(("table", table))
            .bind(("value", value))
            .await?
            .take::<Vec<T>>(0)
            .map_err(decode)?;
        Ok(rows)
    }
}

#[async_trait]
impl Gateway for SurrealGateway {
    async fn create_account(&self, input: CreateAccount) -> GatewayResult<Account> {
        let id = new_key();
        self.create_row(ACCOUNT_TABLE, &id, input.clone()).await?;
        Ok(Account {
            id,
            email: input.email,
            password_hash: input.password_hash,
            created_at: input.created_at,
        })
    }

    async fn account_by_email(&self, email: &str) -> GatewayResult<Option<Account>> {
        Ok(self
            .where_eq::<Account>(ACCOUNT_TABLE, "email", email.to_string())
            .await?
            .into_iter()
            .next())
    }

    async fn accounts_by_ids(&self, ids: &[String]) -> GatewayResult<Vec<Account>> {
        self.by_keys(ACCOUNT_TABLE, ids).await
    }

    async fn create_list_with_owner(&self, input: CreateList) -> GatewayResult<List> {
        let id = new_key();
        let owner = CreateListMembership {
            list_id: id.clone(),
            user_id: input.owner_id.clone(),
            role: ListRole::Owner,
            created_at: input.created_at,
        };
        self.sdb
            .query(
                "BEGIN TRANSACTION;
                 CREATE type::thing($lists, $key) CONTENT $list RETURN NONE;
                 CREATE type::thing($members, $member_key) CONTENT $owner RETURN NONE;
                 COMMIT TRANSACTION;",
            )
            .bind(("lists", LIST_TABLE))
            .bind(("members", LIST_MEMBER_TABLE))
            .bind(("key", id.clone()))
            .bind(("member_key", new_key()))
            .bind(("list", input.clone()))
            .bind(("owner", owner))
            .await?
            .check()?;
        Ok(List {
            id,
            title: input.title,
            description: input.description,
            owner_id: input.owner_id,
            created_at: input.created_at,
            updated_at: None,
        })
    }

    async fn list_by_id(&self, list_id: &str) -> GatewayResult<Option<List>> {
        self.by_key(LIST_TABLE, list_id).await
    }

    async fn lists_by_ids(&self, ids: &[String]) -> GatewayResult<Vec<List>> {
        self.by_keys(LIST_TABLE, ids).await
    }

    async fn memberships_with_lists(
        &self,
        user_id: &str,
    ) -> GatewayResult<Vec<MembershipWithList>> {
        let memberships: Vec<ListMembership> = self
            .where_eq(LIST_MEMBER_TABLE, "user_id", user_id.to_string())
            .await?;
        let list_ids: Vec<String> = memberships.iter().map(|m| m.list_id.clone()).collect();
        let lists: HashMap<String, List> = self
            .lists_by_ids(&list_ids)
            .await?
            .into_iter()
            .map(|l| (l.id.clone(), l))
            .collect();

        let mut rows: Vec<MembershipWithList> = memberships
            .into_iter()
            .map(|m| MembershipWithList {
                list: lists.get(&m.list_id).cloned(),
                list_id: m.list_id,
                role: m.role,
            })
            .collect();
        rows.sort_by_key(|row| std::cmp::Reverse(row.list.as_ref().map(|l| l.created_at)));
        Ok(rows)
    }

    async fn delete_list_cascade(&self, list_id: &str) -> GatewayResult<()> {
        self.sdb
            .query(
                "BEGIN TRANSACTION;
                 DELETE type::table($tasks) WHERE list_id = $list_id;
                 DELETE type::table($members) WHERE list_id = $list_id;
                 DELETE type::table($invitations) WHERE list_id = $list_id;
                 DELETE type::thing($lists, $list_id);
                 COMMIT TRANSACTION;",
            )
            .bind(("tasks", TASK_TABLE))
            .bind(("members", LIST_MEMBER_TABLE))
            .bind(("invitations", INVITATION_TABLE))
            .bind(("lists", LIST_TABLE))
            .bind(("list_id", list_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    async fn find_membership(
        &self,
        list_id: &str,
        user_id: &str,
    ) -> GatewayResult<Option<ListMembership>> {
        let rows = self
            .sdb
            .query(format!(
                "{SELECT_ROW} FROM type::table($table) WHERE list_id = $list_id AND user_id = $user_id;"
            ))
            .bind(("table", LIST_MEMBER_TABLE))
            .bind(("list_id", list_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take::<Vec<ListMembership>>(0)?;
        Ok(rows.into_iter().next())
    }

    async fn memberships_of_list(&self, list_id: &str) -> GatewayResult<Vec<ListMembership>> {
        let rows = self
            .sdb
            .query(format!(
                "{SELECT_ROW} FROM type::table($table) WHERE list_id = $list_id ORDER BY sort_at ASC;"
            ))
            .bind(("table", LIST_MEMBER_TABLE))
            .bind(("list_id", list_id.to_string()))
            .await?
            .take::<Vec<ListMembership>>(0)
            .map_err(decode)?;
        Ok(rows)
    }

    async fn insert_membership(
        &self,
        input: CreateListMembership,
    ) -> GatewayResult<ListMembership> {
        let id = new_key();
        self.create_row(LIST_MEMBER_TABLE, &id, input.clone()).await?;
        Ok(ListMembership {
            id,
            list_id: input.list_id,
            user_id: input.user_id,
            role: input.role,
            created_at: input.created_at,
        })
    }

    async fn create_task(&self, input: CreateTask) -> GatewayResult<Task> {
        let id = new_key();
        self.create_row(TASK_TABLE, &id, input.clone()).await?;
        Ok(Task {
            id,
            list_id: input.list_id,
            title: input.title,
            description: input.description,
            completed: input.completed,
            completed_at: None,
            completed_by: None,
            created_by: input.created_by,
            created_at: input.created_at,
        })
    }

    async fn task_by_id(&self, task_id: &str) -> GatewayResult<Option<Task>> {
        self.by_key(TASK_TABLE, task_id).await
    }

    async fn tasks_for_list(&self, list_id: &str) -> GatewayResult<Vec<Task>> {
        self.where_eq(TASK_TABLE, "list_id", list_id.to_string())
            .await
    }

    async fn update_task(&self, task_id: &str, patch: TaskPatch) -> GatewayResult<Task> {
        let mut task = self
            .task_by_id(task_id)
            .await?
            .ok_or(GatewayError::NotFound)?;
        self.sdb
            .query("UPDATE type::thing($table, $key) MERGE $patch RETURN NONE;")
            .bind(("table", TASK_TABLE))
            .bind(("key", task_id.to_string()))
            .bind(("patch", patch.clone()))
            .await?
            .check()?;
        patch.apply(&mut task);
        Ok(task)
    }

    async fn delete_task(&self, task_id: &str) -> GatewayResult<()> {
        self.sdb
            .query("DELETE type::thing($table, $key);")
            .bind(("table", TASK_TABLE))
            .bind(("key", task_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    async fn subscribe_tasks(&self, list_id: &str) -> GatewayResult<Subscription<TaskChange>> {
        let mut response = self
            .sdb
            .query(format!(
                "LIVE SELECT *, meta::id(id) AS id FROM {TASK_TABLE} WHERE list_id = $list_id;"
            ))
            .bind(("list_id", list_id.to_string()))
            .await?;
        let stream = response.stream::<Live<Task>>(0)?;
        let changes = stream.filter_map(|event| {
            ready(match event {
                Ok(event) => match event.action {
                    Action::Create => Some(TaskChange::Insert(event.data)),
                    Action::Update => Some(TaskChange::Update(event.data)),
                    Action::Delete => Some(TaskChange::Delete(event.data)),
                    _ => None,
                },
                Err(error) => {
                    warn!(%error, "dropping undecodable task event");
                    None
                }
            })
        });
        Ok(Subscription::forward(changes))
    }

    async fn create_invitation(&self, input: CreateInvitation) -> GatewayResult<Invitation> {
        let id = new_key();
        self.create_row(INVITATION_TABLE, &id, input.clone()).await?;
        Ok(Invitation {
            id,
            list_id: input.list_id,
            invited_by: input.invited_by,
            email: input.email,
            token_hash: input.token_hash,
            status: input.status,
            created_at: input.created_at,
            expires_at: input.expires_at,
        })
    }

    async fn invitation_by_id(&self, invitation_id: &str) -> GatewayResult<Option<Invitation>> {
        self.by_key(INVITATION_TABLE, invitation_id).await
    }

    async fn invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> GatewayResult<Option<Invitation>> {
        Ok(self
            .where_eq::<Invitation>(INVITATION_TABLE, "token_hash", token_hash.to_string())
            .await?
            .into_iter()
            .next())
    }

    async fn invitations_by_ids(&self, ids: &[String]) -> GatewayResult<Vec<Invitation>> {
        self.by_keys(INVITATION_TABLE, ids).await
    }

    async fn set_invitation_status(
        &self,
        invitation_id: &str,
        status: InvitationStatus,
    ) -> GatewayResult<Invitation> {
        let mut invitation = self
            .invitation_by_id(invitation_id)
            .await?
            .ok_or(GatewayError::NotFound)?;
        self.sdb
            .query("UPDATE type::thing($table, $key) SET status = $status RETURN NONE;")
            .bind(("table", INVITATION_TABLE))
            .bind(("key", invitation_id.to_string()))
            .bind(("status", status))
            .await?
            .check()?;
        invitation.status = status;
        Ok(invitation)
    }

    async fn create_notification(&self, input: CreateNotification) -> GatewayResult<Notification> {
        let id = new_key();
        self.create_row(NOTIFICATION_TABLE, &id, input.clone()).await?;
        Ok(Notification {
            id,
            user_id: input.user_id,
            kind: input.kind,
            data: input.data,
            read: input.read,
            created_at: input.created_at,
        })
    }

    async fn notifications_for_user(&self, user_id: &str) -> GatewayResult<Vec<Notification>> {
        self.where_eq(NOTIFICATION_TABLE, "user_id", user_id.to_string())
            .await
    }

    async fn notifications_for_invitation(
        &self,
        user_id: &str,
        invitation_id: &str,
    ) -> GatewayResult<Vec<Notification>> {
        let rows = self
            .sdb
            .query(format!(
                "{SELECT_ROW} FROM type::table($table) WHERE user_id = $user_id AND type = $kind AND data.invitation_id = $invitation_id;"
            ))
            .bind(("table", NOTIFICATION_TABLE))
            .bind(("user_id", user_id.to_string()))
            .bind(("kind", NotificationKind::ListInvitation))
            .bind(("invitation_id", invitation_id.to_string()))
            .await?
            .take::<Vec<Notification>>(0)?;
        Ok(rows)
    }

    async fn mark_notifications_read(&self, ids: &[String]) -> GatewayResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.sdb
            .query("UPDATE $things SET read = true RETURN NONE;")
            .bind(("things", record_ids(NOTIFICATION_TABLE, ids)))
            .await?
            .check()?;
        Ok(())
    }

    async fn subscribe_notifications(
        &self,
        user_id: &str,
    ) -> GatewayResult<Subscription<Notification>> {
        let mut response = self
            .sdb
            .query(format!(
                "LIVE SELECT *, meta::id(id) AS id FROM {NOTIFICATION_TABLE} WHERE user_id = $user_id;"
            ))
            .bind(("user_id", user_id.to_string()))
            .await?;
        let stream = response.stream::<Live<Notification>>(0)?;
        let inserts = stream.filter_map(|event| {
            ready(match event {
                Ok(event) if matches!(event.action, Action::Create) => Some(event.data),
                Ok(_) => None,
                Err(error) => {
                    warn!(%error, "dropping undecodable notification event");
                    None
                }
            })
        });
        Ok(Subscription::forward(inserts))
    }

    async fn subscription_for_user(
        &self,
        user_id: &str,
    ) -> GatewayResult<Option<UserSubscription>> {
        let rows = self
            .sdb
            .query("SELECT * OMIT id FROM type::table($table) WHERE user_id = $user_id;")
            .bind(("table", SUBSCRIPTION_TABLE))
            .bind(("user_id", user_id.to_string()))
            .await?
            .take::<Vec<UserSubscription>>(0)?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_subscription(&self, sub: UserSubscription) -> GatewayResult<UserSubscription> {
        // ? keyed by user id so the upsert needs no lookup
        self.sdb
            .query("UPSERT type::thing($table, $key) CONTENT $content RETURN NONE;")
            .bind(("table", SUBSCRIPTION_TABLE))
            .bind(("key", sub.user_id.clone()))
            .bind(("content", sub.clone()))
            .await?
            .check()?;
        Ok(sub)
    }

    async fn update_subscription_by_customer(
        &self,
        customer_id: &str,
        patch: SubscriptionPatch,
    ) -> GatewayResult<Option<UserSubscription>> {
        let rows = self
            .sdb
            .query("SELECT * OMIT id FROM type::table($table) WHERE customer_id = $customer_id;")
            .bind(("table", SUBSCRIPTION_TABLE))
            .bind(("customer_id", customer_id.to_string()))
            .await?
            .take::<Vec<UserSubscription>>(0)?;
        let Some(mut sub) = rows.into_iter().next() else {
            return Ok(None);
        };
        patch.apply(&mut sub, chrono::Utc::now());
        self.upsert_subscription(sub).await.map(Some)
    }
}
