pub mod routes;

use std::net::SocketAddr;

use axum::Router;
use chrono::Duration;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use common::StatusSnapshot;

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    /// Latest dispatcher status; handlers only borrow it.
    pub status: watch::Receiver<StatusSnapshot>,
    /// `/health` turns 503 when the last cycle is older than this.
    pub stale_after: Duration,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(routes::health_router())
        .merge(routes::status_router())
        .with_state(state)
        .layer(cors)
}

/// Bind and run the liveness/status server until the process exits.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Status API listening");
    axum::serve(listener, router(state)).await
}
