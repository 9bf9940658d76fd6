//! Question answering route.

use super::run_blocking;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use quickframe_core::QueryOptions;
use quickframe_types::{Dataset, StructuredResult};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub dataset: Dataset,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_use_cache() -> bool {
    true
}

pub async fn answer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<StructuredResult>, (StatusCode, String)> {
    if req.question.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question must not be empty".to_string()));
    }

    let memo = state.memo.clone();
    let agent = state.agent.clone();

    let outcome = run_blocking(move || {
        let options = QueryOptions {
            use_cache: req.use_cache,
            session_id: req.session_id.as_deref(),
        };
        memo.answer_query_detailed(&req.dataset, &req.question, agent.as_ref(), options)
    })
    .await?;

    info!(
        target: "quickframe::api",
        "Answered query via {:?} in {:.3}s",
        outcome.source, outcome.response_time
    );

    Ok(Json(outcome.result))
}
