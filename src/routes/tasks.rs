use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt, future::ready, stream};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    errors::Result,
    models::task::Task,
    routes::{Envelope, data},
    services::tasks,
    session::CurrentUser,
    state::AppState,
    sync::tasks::TaskSync,
    utils::{validated_form::ValidatedJson, validator::validate_not_blank},
};

pub(crate) type SseItem = core::result::Result<Event, Infallible>;

#[derive(serde::Deserialize, Debug, Clone, validator::Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
}

#[derive(serde::Deserialize, Debug, Clone, validator::Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

#[derive(serde::Deserialize, Debug, Clone, validator::Validate)]
pub struct ToggleTaskRequest {
    pub completed: bool,
}

pub async fn create_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(list_id): Path<String>,
    ValidatedJson(input): ValidatedJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Envelope<Task>>)> {
    let task = tasks::create_task(
        state.gateway.as_ref(),
        &list_id,
        &input.title,
        &input.description,
        &user.id,
    )
    .await?;
    Ok((StatusCode::CREATED, data(task)))
}

pub async fn read_tasks(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(list_id): Path<String>,
) -> Result<Json<Envelope<Vec<Task>>>> {
    Ok(data(
        tasks::get_tasks(state.gateway.as_ref(), &list_id, &user.id).await?,
    ))
}

pub async fn update_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<String>,
    ValidatedJson(input): ValidatedJson<UpdateTaskRequest>,
) -> Result<Json<Envelope<Task>>> {
    let task = tasks::update_task(
        state.gateway.as_ref(),
        &task_id,
        input.title.as_deref(),
        input.description.as_deref(),
        &user.id,
    )
    .await?;
    Ok(data(task))
}

pub async fn toggle_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<String>,
    ValidatedJson(input): ValidatedJson<ToggleTaskRequest>,
) -> Result<Json<Envelope<Task>>> {
    let task =
        tasks::toggle_task_completion(state.gateway.as_ref(), &task_id, input.completed, &user.id)
            .await?;
    Ok(data(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<String>,
) -> Result<Json<Envelope<Value>>> {
    tasks::delete_task(state.gateway.as_ref(), &task_id, &user.id).await?;
    Ok(data(json!({ "deleted": task_id })))
}

/// Serializes `payload` as a named SSE event.
pub(crate) fn sse_event<T: Serialize>(name: &str, payload: &T) -> SseItem {
    Ok(match Event::default().event(name).json_data(payload) {
        Ok(event) => event,
        Err(error) => {
            tracing::error!(%error, name, "could not encode stream event");
            Event::default().event("error").data("encode failed")
        }
    })
}

/// Snapshot of the list's tasks, then a fresh one after every change.
pub async fn task_stream(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(list_id): Path<String>,
) -> Result<Sse<impl Stream<Item = SseItem>>> {
    let mut sync = TaskSync::new(state.gateway.clone(), user.id);
    sync.open(&list_id).await?;

    let first = sse_event("tasks", &sync.tasks());
    let changes = stream::unfold(sync, |mut sync| async move {
        if sync.next_event().await {
            let event = sse_event("tasks", &sync.tasks());
            Some((event, sync))
        } else {
            None
        }
    });

    Ok(Sse::new(stream::once(ready(first)).chain(changes)).keep_alive(KeepAlive::default()))
}
