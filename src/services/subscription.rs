use crate::errors::Result;
use crate::gateway::Gateway;
use crate::models::subscription::UserSubscription;
use crate::utils::time::time_now;

/// The caller's billing record, or a free default when none exists yet.
pub async fn get_subscription(gateway: &dyn Gateway, user_id: &str) -> Result<UserSubscription> {
    Ok(gateway
        .subscription_for_user(user_id)
        .await?
        .unwrap_or_else(|| UserSubscription::free(user_id.to_string(), time_now())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::MemoryGateway;
    use crate::models::subscription::Plan;

    #[tokio::test]
    async fn test_missing_record_reads_as_free() {
        let gw = MemoryGateway::new();
        let sub = get_subscription(&gw, "alice").await.unwrap();
        assert_eq!(sub.plan, Plan::Free);
        assert_eq!(sub.user_id, "alice");
        assert!(gw.subscription_rows().await.is_empty());
    }
}
