//! Persisted conversation and quick-answer records.

use crate::{truncate_chars, Fingerprint, StructuredResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed query in a session's history. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: i64,
    pub session_id: String,
    pub question: String,
    /// Serialized answer payload.
    pub answer: String,
    pub question_hash: Fingerprint,
    pub data_hash: Fingerprint,
    pub timestamp: DateTime<Utc>,
    /// Seconds between receiving the question and producing the answer.
    pub response_time: f64,
}

impl ConversationEntry {
    /// Question text cut to `max_chars`, with an ellipsis when shortened.
    pub fn preview(&self, max_chars: usize) -> String {
        let head = truncate_chars(&self.question, max_chars);
        if head.len() < self.question.len() {
            format!("{}...", head)
        } else {
            head.to_string()
        }
    }

    /// The stored answer as a structured payload, if it parses as one.
    pub fn parsed_answer(&self) -> Option<StructuredResult> {
        StructuredResult::from_json(&self.answer).ok()
    }
}

/// A deduplicated cache entry, unique per `(question_hash, data_hash)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickAnswer {
    pub id: i64,
    pub question_hash: Fingerprint,
    pub data_hash: Fingerprint,
    pub question: String,
    /// Serialized answer payload.
    pub answer: String,
    pub hit_count: u32,
    pub last_used: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of a cache lookup hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAnswer {
    /// Serialized answer payload.
    pub answer: String,
    /// Hit count after this lookup was counted.
    pub hit_count: u32,
}

/// A frequently asked question for a dataset fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopularQuestion {
    pub question: String,
    pub hit_count: u32,
    pub last_used: DateTime<Utc>,
}

/// Aggregate usage numbers for a session and dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Conversations logged under the session.
    pub session_count: u64,
    /// Quick answers cached for the dataset fingerprint.
    pub quick_answers_count: u64,
    /// Conversations across all sessions.
    pub total_conversations: u64,
    /// Mean response time in seconds for the dataset, 0 when there are none.
    pub avg_response_time: f64,
}
