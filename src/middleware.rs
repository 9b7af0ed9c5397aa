use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::consts::route_const::SESSION_COOKIE;
use crate::errors::{Error, Result as RResult};
use crate::guard::{GuardDecision, decide};
use crate::session::CurrentUser;
use crate::state::AppState;

/// API routes: a live session is mandatory.
pub async fn auth_jwt_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<impl IntoResponse, Response> {
    let request = buffer_request_and_authenticate(&state, request).await?;

    Ok(next.run(request).await)
}

async fn buffer_request_and_authenticate<B>(
    state: &AppState,
    request: Request<B>,
) -> Result<Request<B>, Response> {
    let (mut parts, body) = request.into_parts();
    let user = check_auth_parts(state, &parts)
        .await
        .map_err(IntoResponse::into_response)?;

    parts.extensions.insert(user);

    Ok(Request::from_parts(parts, body))
}

/// Page routes: decides between passing through and redirecting.
pub async fn route_guard_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let user = check_auth_parts(&state, &parts).await.ok();

    match decide(parts.uri.path(), parts.uri.query(), user.is_some()) {
        GuardDecision::Redirect(location) => {
            tracing::debug!(path = parts.uri.path(), %location, "guard redirect");
            Redirect::to(&location).into_response()
        }
        GuardDecision::Pass => {
            if let Some(user) = user {
                parts.extensions.insert(user);
            }
            next.run(Request::from_parts(parts, body)).await
        }
    }
}

fn bearer_token(parts: &Parts) -> RResult<Option<&str>> {
    let Some(header_value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let header_value = header_value.to_str().map_err(|_| Error::InvalidToken)?;

    let mut pieces = header_value.trim().splitn(2, ' ');
    let scheme = pieces.next().ok_or(Error::MissingToken)?;
    let token = pieces.next().ok_or(Error::MissingToken)?;

    if scheme != "Bearer" {
        tracing::warn!("Invalid auth scheme: {scheme}");
        return Err(Error::InvalidScheme);
    }
    Ok(Some(token.trim()))
}

fn cookie_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

async fn check_auth_parts(state: &AppState, parts: &Parts) -> RResult<CurrentUser> {
    let token = match bearer_token(parts)? {
        Some(token) => token,
        None => cookie_token(parts).ok_or(Error::MissingToken)?,
    };

    state.sessions.resolve(token).await
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> RResult<Self> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(Error::MissingToken)
    }
}
