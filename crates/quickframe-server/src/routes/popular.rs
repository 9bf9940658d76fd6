//! Popular questions route.

use super::run_blocking;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use quickframe_core::hash_dataset;
use quickframe_types::{Dataset, PopularQuestion};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct PopularRequest {
    pub dataset: Dataset,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct PopularResponse {
    pub questions: Vec<PopularQuestion>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PopularRequest>,
) -> Result<Json<PopularResponse>, (StatusCode, String)> {
    let limit = req.limit.unwrap_or(state.config.popular_limit);
    let data_hash = hash_dataset(&req.dataset);
    let store = state.memo.store().clone();
    let questions = run_blocking(move || store.popular_questions(&data_hash, limit)).await?;

    Ok(Json(PopularResponse { questions }))
}
