//! Usage statistics route.

use super::run_blocking;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use quickframe_core::hash_dataset;
use quickframe_types::{Dataset, MemoryStats};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct StatsRequest {
    pub dataset: Dataset,
    pub session_id: String,
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StatsRequest>,
) -> Result<Json<MemoryStats>, (StatusCode, String)> {
    let data_hash = hash_dataset(&req.dataset);
    let store = state.memo.store().clone();
    let stats = run_blocking(move || store.stats(&req.session_id, &data_hash)).await?;

    Ok(Json(stats))
}
