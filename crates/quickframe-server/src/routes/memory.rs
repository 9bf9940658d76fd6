//! Full memory wipe.

use super::run_blocking;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Serialize)]
pub struct ClearMemoryResponse {
    pub cleared: bool,
}

pub async fn clear(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearMemoryResponse>, (StatusCode, String)> {
    let store = state.memo.store().clone();
    match run_blocking(move || store.delete_all()).await {
        Ok(cleared) => {
            warn!(target: "quickframe::api", "Memory wiped");
            Ok(Json(ClearMemoryResponse { cleared }))
        }
        Err((status, message)) => {
            error!(target: "quickframe::api", "Failed to wipe memory: {}", message);
            Err((status, message))
        }
    }
}
