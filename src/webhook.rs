//! Payment provider webhooks.
//!
//! The `Stripe-Signature` header carries `t=<unix>,v1=<hex>[,v1=<hex>...]`.
//! The signed payload is `"{t}.{raw body}"` under HMAC-SHA256. Nothing is
//! written unless the signature checks out.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info};

use crate::consts::webhook_const::SIGNATURE_TOLERANCE_SECS;
use crate::errors::{Error, Result};
use crate::gateway::Gateway;
use crate::models::subscription::{Plan, SubscriptionPatch, UserSubscription};
use crate::utils::time::{from_unix, time_now};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Applied,
    Ignored,
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    Error::WebhookSignature("invalid signature timestamp".into())
                })?);
            }
            "v1" => {
                // ? undecodable entries cannot match, skip them
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| Error::WebhookSignature("missing signature timestamp".into()))?;
    if signatures.is_empty() {
        return Err(Error::WebhookSignature("no v1 signature".into()));
    }
    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<()> {
    let parsed = parse_header(header)?;

    if now.abs_diff(parsed.timestamp) > SIGNATURE_TOLERANCE_SECS {
        return Err(Error::WebhookSignature(
            "signature timestamp outside tolerance".into(),
        ));
    }

    let matched = parsed.signatures.iter().any(|candidate| {
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(parsed.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(candidate).is_ok()
    });

    if matched {
        Ok(())
    } else {
        Err(Error::WebhookSignature("signature mismatch".into()))
    }
}

/// Verifies, decodes and dispatches one delivery.
pub async fn handle_webhook(
    gateway: &dyn Gateway,
    secret: Option<&str>,
    signature: Option<&str>,
    payload: &[u8],
) -> Result<Dispatched> {
    let (Some(secret), Some(signature)) = (secret, signature) else {
        return Err(Error::MissingWebhookSecret);
    };
    verify_signature(payload, signature, secret, time_now().timestamp())?;

    let event: WebhookEvent = serde_json::from_slice(payload)
        .map_err(|e| Error::WebhookPayload(format!("malformed event: {e}")))?;
    dispatch(gateway, &event).await
}

fn str_field<'a>(object: &'a Value, pointer: &str) -> Option<&'a str> {
    object.pointer(pointer).and_then(Value::as_str)
}

fn unix_field(object: &Value, pointer: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    object.pointer(pointer).and_then(Value::as_i64).and_then(from_unix)
}

pub async fn dispatch(gateway: &dyn Gateway, event: &WebhookEvent) -> Result<Dispatched> {
    let object = &event.data.object;
    match event.kind.as_str() {
        "checkout.session.completed" => {
            let Some(subscription_id) = str_field(object, "/subscription") else {
                debug!(event_id = %event.id, "checkout without subscription");
                return Ok(Dispatched::Ignored);
            };
            let user_id = str_field(object, "/metadata/userId")
                .ok_or_else(|| Error::WebhookPayload("checkout without metadata.userId".into()))?;

            gateway
                .upsert_subscription(UserSubscription {
                    user_id: user_id.to_string(),
                    customer_id: str_field(object, "/customer").map(str::to_string),
                    subscription_id: Some(subscription_id.to_string()),
                    plan: Plan::Pro,
                    status: "active".to_string(),
                    current_period_start: None,
                    current_period_end: None,
                    updated_at: time_now(),
                })
                .await
                .map_err(Error::WebhookDispatch)?;
            info!(event_id = %event.id, user_id, "checkout completed, plan is pro");
            Ok(Dispatched::Applied)
        }
        "customer.subscription.updated" | "customer.subscription.deleted" => {
            let customer_id = str_field(object, "/customer")
                .ok_or_else(|| Error::WebhookPayload("subscription event without customer".into()))?;

            let patch = if event.kind == "customer.subscription.deleted" {
                SubscriptionPatch {
                    plan: Some(Plan::Free),
                    status: Some("canceled".to_string()),
                    ..SubscriptionPatch::default()
                }
            } else {
                SubscriptionPatch {
                    status: str_field(object, "/status").map(str::to_string),
                    current_period_start: unix_field(object, "/current_period_start"),
                    current_period_end: unix_field(object, "/current_period_end"),
                    ..SubscriptionPatch::default()
                }
            };

            match gateway
                .update_subscription_by_customer(customer_id, patch)
                .await
                .map_err(Error::WebhookDispatch)?
            {
                Some(sub) => {
                    info!(event_id = %event.id, user_id = %sub.user_id, status = %sub.status, kind = %event.kind, "subscription updated");
                    Ok(Dispatched::Applied)
                }
                None => {
                    debug!(event_id = %event.id, customer_id, "no subscription for customer");
                    Ok(Dispatched::Ignored)
                }
            }
        }
        other => {
            debug!(event_id = %event.id, kind = other, "webhook event ignored");
            Ok(Dispatched::Ignored)
        }
    }
}

/// Builds a valid signature header for `payload`.
#[cfg(test)]
pub(crate) fn signed_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use axum::response::IntoResponse;

    use super::*;
    use crate::gateway::memory::MemoryGateway;

    const SECRET: &str = "whsec_test";

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn checkout() -> Vec<u8> {
        body(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": {"userId": "alice"}
            }}
        }))
    }

    #[test]
    fn test_signature_checks() {
        let payload = b"{}";
        let now = 1_700_000_000;
        let header = signed_header(SECRET, now, payload);

        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
        assert!(verify_signature(payload, &header, "other", now).is_err());
        assert!(verify_signature(b"{ }", &header, SECRET, now).is_err());
        assert!(verify_signature(payload, &header, SECRET, now + 301).is_err());
        assert!(verify_signature(payload, "garbage", SECRET, now).is_err());

        let rotated = format!("{header},v1=00ff");
        assert!(verify_signature(payload, &rotated, SECRET, now).is_ok());
    }

    #[tokio::test]
    async fn test_bad_signature_touches_nothing() {
        let gw = MemoryGateway::new();
        let payload = checkout();
        let header = signed_header("wrong", time_now().timestamp(), &payload);

        let err = handle_webhook(&gw, Some(SECRET), Some(&header), &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WebhookSignature(_)));

        let err = handle_webhook(&gw, Some(SECRET), None, &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingWebhookSecret));

        assert!(gw.subscription_rows().await.is_empty());
        assert_eq!(gw.calls("upsert_subscription").await, 0);
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let gw = MemoryGateway::new();
        let now = time_now().timestamp();
        let send = |payload: Vec<u8>| {
            let header = signed_header(SECRET, now, &payload);
            (payload, header)
        };

        let (payload, header) = send(checkout());
        let handled = handle_webhook(&gw, Some(SECRET), Some(&header), &payload)
            .await
            .unwrap();
        assert_eq!(handled, Dispatched::Applied);
        let rows = gw.subscription_rows().await;
        assert_eq!(rows[0].plan, Plan::Pro);
        assert_eq!(rows[0].status, "active");

        let (payload, header) = send(body(json!({
            "id": "evt_2",
            "type": "customer.subscription.updated",
            "data": {"object": {
                "customer": "cus_1",
                "status": "past_due",
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000
            }}
        })));
        handle_webhook(&gw, Some(SECRET), Some(&header), &payload)
            .await
            .unwrap();
        let rows = gw.subscription_rows().await;
        assert_eq!(rows[0].status, "past_due");
        assert_eq!(rows[0].current_period_start, from_unix(1_700_000_000));

        let (payload, header) = send(body(json!({
            "id": "evt_3",
            "type": "customer.subscription.deleted",
            "data": {"object": {"customer": "cus_1"}}
        })));
        handle_webhook(&gw, Some(SECRET), Some(&header), &payload)
            .await
            .unwrap();
        let rows = gw.subscription_rows().await;
        assert_eq!(rows[0].status, "canceled");
        assert_eq!(rows[0].plan, Plan::Free);
    }

    #[tokio::test]
    async fn test_unknown_events_and_customers_are_ignored() {
        let gw = MemoryGateway::new();
        let now = time_now().timestamp();

        for value in [
            json!({"id": "evt_4", "type": "invoice.paid", "data": {"object": {}}}),
            json!({
                "id": "evt_5",
                "type": "customer.subscription.updated",
                "data": {"object": {"customer": "cus_nobody", "status": "active"}}
            }),
        ] {
            let payload = body(value);
            let header = signed_header(SECRET, now, &payload);
            let handled = handle_webhook(&gw, Some(SECRET), Some(&header), &payload)
                .await
                .unwrap();
            assert_eq!(handled, Dispatched::Ignored);
        }
        assert!(gw.subscription_rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_platform_failure_is_a_bad_request() {
        let gw = MemoryGateway::new();
        gw.fail_on("upsert_subscription").await;
        let payload = checkout();
        let header = signed_header(SECRET, time_now().timestamp(), &payload);

        let err = handle_webhook(&gw, Some(SECRET), Some(&header), &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WebhookDispatch(_)));
        assert_eq!(
            err.into_response().status(),
            axum::http::StatusCode::BAD_REQUEST
        );
        assert!(gw.subscription_rows().await.is_empty());
    }
}
