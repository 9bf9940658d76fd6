//! Session history routes.

use super::run_blocking;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use quickframe_core::new_session_id;
use quickframe_types::{ConversationEntry, StructuredResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Characters of the question shown in history listings.
const PREVIEW_CHARS: usize = 50;

#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

pub async fn create() -> Json<CreateSessionResponse> {
    let session_id = new_session_id();
    info!(target: "quickframe::session", "Allocated session {}", session_id);
    Json(CreateSessionResponse { session_id })
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A stored answer, decoded when it is a structured payload.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum HistoryAnswer {
    Structured(StructuredResult),
    Raw(String),
}

/// One conversation as returned over HTTP.
#[derive(Debug, Serialize)]
pub struct HistoryItem {
    pub id: i64,
    pub question: String,
    pub preview: String,
    pub answer: HistoryAnswer,
    pub timestamp: DateTime<Utc>,
    pub response_time: f64,
}

impl From<ConversationEntry> for HistoryItem {
    fn from(entry: ConversationEntry) -> Self {
        let preview = entry.preview(PREVIEW_CHARS);
        let answer = match entry.parsed_answer() {
            Some(result) => HistoryAnswer::Structured(result),
            None => HistoryAnswer::Raw(entry.answer),
        };
        Self {
            id: entry.id,
            question: entry.question,
            preview,
            answer,
            timestamp: entry.timestamp,
            response_time: entry.response_time,
        }
    }
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub conversations: Vec<HistoryItem>,
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(state.config.history_limit);
    let store = state.memo.store().clone();
    let session_id = id.clone();
    let entries = run_blocking(move || store.recent_conversations(&session_id, limit)).await?;

    Ok(Json(HistoryResponse {
        session_id: id,
        conversations: entries.into_iter().map(HistoryItem::from).collect(),
    }))
}

#[derive(Serialize)]
pub struct DeleteSessionResponse {
    pub deleted: u32,
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteSessionResponse>, (StatusCode, String)> {
    let store = state.memo.store().clone();
    let session_id = id.clone();
    let deleted = run_blocking(move || store.delete_session(&session_id)).await?;

    info!(target: "quickframe::api", "Cleared {} conversations from session {}", deleted, id);
    Ok(Json(DeleteSessionResponse { deleted }))
}
