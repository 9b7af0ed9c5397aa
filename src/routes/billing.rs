use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde_json::{Value, json};

use crate::{
    config::PriceIds,
    consts::webhook_const::SIGNATURE_HEADER,
    errors::Result,
    models::subscription::UserSubscription,
    routes::{Envelope, data},
    services::subscription,
    session::CurrentUser,
    state::AppState,
    webhook::handle_webhook,
};

/// Raw body is required, the signature covers the exact bytes.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    handle_webhook(
        state.gateway.as_ref(),
        state.config.webhook_secret.as_deref(),
        signature,
        &body,
    )
    .await?;

    Ok(Json(json!({ "received": true })))
}

pub async fn read_subscription(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Envelope<UserSubscription>>> {
    Ok(data(
        subscription::get_subscription(state.gateway.as_ref(), &user.id).await?,
    ))
}

pub async fn read_prices(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Json<Envelope<PriceIds>> {
    data(state.config.prices.clone())
}
