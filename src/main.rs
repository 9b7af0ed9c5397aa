use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{
    config::Config,
    errors::Result,
    routes::{api_router, page_router},
    state::AppState,
};

pub mod config;
pub mod consts;
pub mod errors;
pub mod gateway;
pub mod guard;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;
pub mod sync;
pub mod utils;
pub mod webhook;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().inspect_err(|e| error!("startup aborted: {e}"))?;
    let bind_addr = config.bind_addr.clone();
    let state = AppState::init(config).await?;

    info!("Starting server");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Serving sharelist at http://{}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(page_router(state.clone()))
        .nest("/api", api_router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
