use axum::{
    Json, Router, middleware,
    routing::{delete, get, patch, post},
};
use serde::Serialize;

use crate::{
    middleware::{auth_jwt_middleware, route_guard_middleware},
    state::AppState,
};

pub mod auth_route;
pub mod billing;
pub mod invitations;
pub mod lists;
pub mod notifications;
pub mod pages;
pub mod tasks;


/// Success body: `{"data": ...}`. Errors use `{"error": ...}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
}

pub fn data<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { data })
}

/// Page-level routes behind the navigation guard.
pub fn page_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(auth_route::register))
        .route("/auth/login", post(auth_route::login))
        .route("/dashboard", get(pages::dashboard))
        .route("/list/{list_id}", get(pages::list_page))
        .route("/invitation/{token}", get(pages::invitation_page))
        .route("/accept-invite", get(pages::accept_invite))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            route_guard_middleware,
        ))
        .with_state(state)
}

/// JSON API. Everything except the webhook needs a live session.
pub fn api_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/logout", post(auth_route::logout))
        // ! lists
        .route("/lists", get(lists::read_lists).post(lists::create_list))
        .route(
            "/lists/{list_id}",
            get(lists::read_list).delete(lists::delete_list),
        )
        .route("/lists/{list_id}/members", get(lists::read_members))
        // ! tasks
        .route(
            "/lists/{list_id}/tasks",
            get(tasks::read_tasks).post(tasks::create_task),
        )
        .route("/lists/{list_id}/tasks/stream", get(tasks::task_stream))
        .route("/tasks/{task_id}", patch(tasks::update_task))
        .route("/tasks/{task_id}", delete(tasks::delete_task))
        .route("/tasks/{task_id}/toggle", post(tasks::toggle_task))
        // ! invitations
        .route(
            "/lists/{list_id}/invitations",
            post(invitations::create_invitation),
        )
        .route(
            "/invitations/{invitation_id}/accept",
            post(invitations::accept_invitation),
        )
        .route(
            "/invitations/{invitation_id}/reject",
            post(invitations::reject_invitation),
        )
        // ! notifications
        .route("/notifications", get(notifications::read_notifications))
        .route(
            "/notifications/stream",
            get(notifications::notification_stream),
        )
        .route(
            "/notifications/{notification_id}/read",
            post(notifications::mark_read),
        )
        .route(
            "/notifications/{notification_id}/accept",
            post(notifications::accept),
        )
        .route(
            "/notifications/{notification_id}/reject",
            post(notifications::reject),
        )
        // ! billing
        .route("/subscription", get(billing::read_subscription))
        .route("/pro/prices", get(billing::read_prices))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_jwt_middleware,
        ));

    Router::new()
        .route("/webhooks/stripe", post(billing::stripe_webhook))
        .merge(protected)
        .with_state(state)
}
