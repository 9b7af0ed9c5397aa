use axum::{
    Json,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    consts::{route_const::SESSION_COOKIE, session_const::SESSION_TTL_DAYS},
    errors::Result,
    guard::post_login_destination,
    models::user::Account,
    routes::{Envelope, data},
    services::auth::{self, LoginRequest, LoginResponse, RegisterRequest},
    session::CurrentUser,
    state::AppState,
    utils::validated_form::ValidatedJson,
};

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age_secs}")
}

pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Envelope<Account>>)> {
    let account = auth::register(state.gateway.as_ref(), input).await?;
    Ok((StatusCode::CREATED, data(account)))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse> {
    let (token, user) = auth::login(
        state.gateway.as_ref(),
        &state.sessions,
        &input.email,
        &input.password,
    )
    .await?;

    let redirect_to = post_login_destination(input.redirect.as_deref(), input.token.as_deref());
    let cookie = session_cookie(&token, SESSION_TTL_DAYS * 24 * 60 * 60);

    Ok((
        [(SET_COOKIE, cookie)],
        data(LoginResponse {
            token,
            user,
            redirect_to,
        }),
    ))
}

pub async fn logout(State(state): State<AppState>, user: CurrentUser) -> impl IntoResponse {
    let closed = auth::logout(&state.sessions, &user).await;
    (
        [(SET_COOKIE, session_cookie("", 0))],
        data(json!({ "logged_out": closed })),
    )
}
