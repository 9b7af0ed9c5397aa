use axum::{
    Json,
    extract::{Path, Query, State},
    response::Redirect,
};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, Result},
    models::{
        invitation::{InvitationRef, ResolvedInvitation},
        list::{ListDetail, UserList},
        task::Task,
    },
    routes::{Envelope, data},
    services::{invitation, lists, tasks},
    session::CurrentUser,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct ListPage {
    #[serde(flatten)]
    pub detail: ListDetail,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInviteQuery {
    pub token: Option<String>,
}

pub async fn dashboard(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Envelope<Vec<UserList>>>> {
    Ok(data(lists::get_lists(state.gateway.as_ref(), &user.id).await?))
}

pub async fn list_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(list_id): Path<String>,
) -> Result<Json<Envelope<ListPage>>> {
    let gateway = state.gateway.as_ref();
    let detail = lists::get_list(gateway, &list_id, &user.id).await?;
    let tasks = tasks::get_tasks(gateway, &list_id, &user.id).await?;
    Ok(data(ListPage { detail, tasks }))
}

/// Public preview of a pending invitation.
pub async fn invitation_page(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Envelope<ResolvedInvitation>>> {
    Ok(data(
        invitation::resolve_invitation_by_token(state.gateway.as_ref(), &token).await?,
    ))
}

/// Deep-link target. Accepts and lands on the list.
pub async fn accept_invite(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<AcceptInviteQuery>,
) -> Result<Redirect> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::InvalidInput("missing invitation token".into()))?;

    let outcome =
        invitation::accept_invitation(state.gateway.as_ref(), InvitationRef::Token(token), &user)
            .await?;

    if !outcome.success {
        return Err(Error::InvitationInvalidOrExpired);
    }
    Ok(Redirect::to(&format!("/list/{}", outcome.list_id)))
}
