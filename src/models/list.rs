use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ListRole {
    Owner,
    Member,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct List {
    pub id: String,
    pub title: String,
    pub description: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CreateList {
    pub title: String,
    pub description: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ListMembership {
    pub id: String,
    pub list_id: String,
    pub user_id: String,
    pub role: ListRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CreateListMembership {
    pub list_id: String,
    pub user_id: String,
    pub role: ListRole,
    pub created_at: DateTime<Utc>,
}

/// A membership row joined with its list, `list` is `None` when the list
/// row is gone but the membership survived.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MembershipWithList {
    pub list_id: String,
    pub role: ListRole,
    pub list: Option<List>,
}

/// One list as the dashboard shows it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserList {
    #[serde(flatten)]
    pub list: List,
    pub role: ListRole,
    pub is_owner: bool,
}

/// A member as the list page shows it. `email` is `None` when the account
/// lookup came back without it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ListMember {
    pub user_id: String,
    pub role: ListRole,
    pub email: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ListDetail {
    pub list: List,
    pub is_owner: bool,
}
