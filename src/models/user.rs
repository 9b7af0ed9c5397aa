use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Display name derived from the email's local part.
    pub fn display_name(&self) -> String {
        self.email
            .split('@')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateAccount {
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}
