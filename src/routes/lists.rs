use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};

use crate::{
    errors::Result,
    models::list::{List, ListDetail, ListMember, UserList},
    routes::{Envelope, data},
    services::lists,
    session::CurrentUser,
    state::AppState,
    utils::{validated_form::ValidatedJson, validator::validate_not_blank},
};

#[derive(serde::Deserialize, Debug, Clone, validator::Validate)]
pub struct CreateListRequest {
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
}

pub async fn create_list(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(input): ValidatedJson<CreateListRequest>,
) -> Result<(StatusCode, Json<Envelope<List>>)> {
    let list = lists::create_list(
        state.gateway.as_ref(),
        &input.title,
        &input.description,
        &user.id,
    )
    .await?;
    Ok((StatusCode::CREATED, data(list)))
}

pub async fn read_lists(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Envelope<Vec<UserList>>>> {
    Ok(data(lists::get_lists(state.gateway.as_ref(), &user.id).await?))
}

pub async fn read_list(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(list_id): Path<String>,
) -> Result<Json<Envelope<ListDetail>>> {
    Ok(data(
        lists::get_list(state.gateway.as_ref(), &list_id, &user.id).await?,
    ))
}

pub async fn delete_list(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(list_id): Path<String>,
) -> Result<Json<Envelope<Value>>> {
    lists::delete_list(state.gateway.as_ref(), &list_id, &user.id).await?;
    Ok(data(json!({ "deleted": list_id })))
}

pub async fn read_members(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(list_id): Path<String>,
) -> Result<Json<Envelope<Vec<ListMember>>>> {
    Ok(data(
        lists::members_of_list(state.gateway.as_ref(), &list_id, &user).await?,
    ))
}
