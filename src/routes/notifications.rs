use axum::{
    Json,
    extract::{Path, State},
    response::sse::{KeepAlive, Sse},
};
use futures::{Stream, StreamExt, future::ready, stream};
use serde::Serialize;

use crate::{
    errors::Result,
    models::{invitation::AcceptOutcome, notification::EnrichedNotification},
    routes::{
        Envelope, data,
        tasks::{SseItem, sse_event},
    },
    session::CurrentUser,
    state::AppState,
    sync::notifications::NotificationView,
};

#[derive(Debug, Serialize)]
pub struct NotificationItem {
    #[serde(flatten)]
    pub item: EnrichedNotification,
    pub summary: String,
    pub actionable: bool,
}

#[derive(Debug, Serialize)]
pub struct NotificationFeed {
    pub items: Vec<NotificationItem>,
    pub unread_count: usize,
}

#[derive(Debug, Serialize)]
pub struct AcceptedFromNotification {
    pub outcome: AcceptOutcome,
    pub notifications: NotificationFeed,
}

fn feed(view: &NotificationView) -> NotificationFeed {
    NotificationFeed {
        items: view
            .items()
            .iter()
            .map(|item| NotificationItem {
                summary: view.summary(item),
                actionable: view.is_actionable(item),
                item: item.clone(),
            })
            .collect(),
        unread_count: view.unread_count(),
    }
}

async fn loaded(state: &AppState, user: &CurrentUser) -> Result<NotificationView> {
    let mut view =
        NotificationView::new(state.gateway.clone(), user.clone()).sharing(state.settled.clone());
    view.load().await?;
    Ok(view)
}

pub async fn read_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Envelope<NotificationFeed>>> {
    let view = loaded(&state, &user).await?;
    Ok(data(feed(&view)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(notification_id): Path<String>,
) -> Result<Json<Envelope<NotificationFeed>>> {
    let mut view = loaded(&state, &user).await?;
    view.mark_read(&notification_id).await?;
    Ok(data(feed(&view)))
}

pub async fn accept(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(notification_id): Path<String>,
) -> Result<Json<Envelope<AcceptedFromNotification>>> {
    let mut view = loaded(&state, &user).await?;
    let outcome = view.handle_accept_invitation(&notification_id).await?;
    Ok(data(AcceptedFromNotification {
        outcome,
        notifications: feed(&view),
    }))
}

pub async fn reject(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(notification_id): Path<String>,
) -> Result<Json<Envelope<NotificationFeed>>> {
    let mut view = loaded(&state, &user).await?;
    view.handle_reject_invitation(&notification_id).await?;
    Ok(data(feed(&view)))
}

/// Current feed, then a reloaded one whenever a notification arrives.
pub async fn notification_stream(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Sse<impl Stream<Item = SseItem>>> {
    let mut view = loaded(&state, &user).await?;
    view.watch().await?;

    let first = sse_event("notifications", &feed(&view));
    let changes = stream::unfold(view, |mut view| async move {
        match view.next_change().await {
            Ok(true) => {
                let event = sse_event("notifications", &feed(&view));
                Some((event, view))
            }
            Ok(false) => None,
            Err(error) => {
                tracing::warn!(%error, "notification stream stopped");
                None
            }
        }
    });

    Ok(Sse::new(stream::once(ready(first)).chain(changes)).keep_alive(KeepAlive::default()))
}
