use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Free,
    Pro,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct UserSubscription {
    pub user_id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub plan: Plan,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl UserSubscription {
    pub fn free(user_id: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            customer_id: None,
            subscription_id: None,
            plan: Plan::Free,
            status: "inactive".to_string(),
            current_period_start: None,
            current_period_end: None,
            updated_at: now,
        }
    }
}

/// Partial update keyed by the payment provider's customer id.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct SubscriptionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
}

impl SubscriptionPatch {
    pub fn apply(&self, sub: &mut UserSubscription, now: DateTime<Utc>) {
        if let Some(plan) = self.plan {
            sub.plan = plan;
        }
        if let Some(status) = &self.status {
            sub.status = status.clone();
        }
        if let Some(start) = self.current_period_start {
            sub.current_period_start = Some(start);
        }
        if let Some(end) = self.current_period_end {
            sub.current_period_end = Some(end);
        }
        sub.updated_at = now;
    }
}
