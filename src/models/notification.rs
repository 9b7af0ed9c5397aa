use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::invitation::Invitation;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ListInvitation,
    #[serde(other)]
    Other,
}

/// Lookup keys carried by a `list_invitation` notification. Any of them may
/// point at a row that no longer exists.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct InvitationRefs {
    pub invitation_id: Option<String>,
    pub list_id: Option<String>,
    pub invited_by: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub data: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn invitation_refs(&self) -> Option<InvitationRefs> {
        if self.kind != NotificationKind::ListInvitation {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }

    pub fn references_invitation(&self, invitation_id: &str) -> bool {
        self.invitation_refs()
            .and_then(|refs| refs.invitation_id)
            .is_some_and(|id| id == invitation_id)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CreateNotification {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub data: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl CreateNotification {
    pub fn list_invitation(user_id: String, refs: InvitationRefs, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            kind: NotificationKind::ListInvitation,
            data: serde_json::json!(refs),
            read: false,
            created_at,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EnrichedNotification {
    #[serde(flatten)]
    pub notification: Notification,
    pub invitation: Option<Invitation>,
    pub list_title: Option<String>,
    pub inviter_name: Option<String>,
}
