//! HTTP route handlers.

pub mod memory;
pub mod popular;
pub mod query;
pub mod sessions;
pub mod stats;

use crate::state::AppState;
use axum::{
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the `/api` router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/query", post(query::answer))
        .route("/sessions", post(sessions::create))
        .route("/sessions/{id}", delete(sessions::delete))
        .route("/sessions/{id}/history", get(sessions::history))
        .route("/popular", post(popular::list))
        .route("/stats", post(stats::get))
        .route("/memory", delete(memory::clear))
        .route("/health", get(health));

    Router::new().nest("/api", api_routes).with_state(state)
}

/// Map a core failure to a 500 response.
pub(crate) fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Run store or agent work on the blocking pool.
///
/// SQLite calls and agent processes block, so handlers never run them on async workers.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, (StatusCode, String)>
where
    F: FnOnce() -> quickframe_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(internal_error)?
        .map_err(internal_error)
}
