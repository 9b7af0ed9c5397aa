use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::list::List;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl InvitationStatus {
    /// `accepted` and `rejected` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Invitation {
    pub id: String,
    pub list_id: String,
    pub invited_by: String,
    pub email: String,
    // ? sha-256 of the bearer token, the token itself only lives in the link
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Invitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateInvitation {
    pub list_id: String,
    pub invited_by: String,
    pub email: String,
    pub token_hash: String,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// How an accept request names its invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvitationRef {
    Id(String),
    Token(String),
}

#[derive(Serialize, Debug, Clone)]
pub struct CreatedInvitation {
    pub invitation: Invitation,
    pub invite_link: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct ResolvedInvitation {
    pub invitation: Invitation,
    pub list: List,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AcceptOutcome {
    pub success: bool,
    pub list_id: String,
    pub already_accepted: bool,
    pub already_member: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RejectOutcome {
    pub success: bool,
}
