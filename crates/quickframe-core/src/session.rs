//! Per-UI-session identifiers used to scope conversation history.

use chrono::Utc;
use once_cell::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

/// Allocate a fresh session id from the current time plus a random component.
pub fn new_session_id() -> String {
    format!("session_{}_{}", Utc::now().timestamp(), Uuid::new_v4().simple())
}

/// Lazily assigned identifier for one UI session.
#[derive(Debug, Default)]
pub struct SessionContext {
    id: OnceCell<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session id, creating it on first call.
    pub fn get_or_create_session_id(&self) -> &str {
        self.id.get_or_init(|| {
            let id = new_session_id();
            debug!(target: "quickframe::session", "Created session {}", id);
            id
        })
    }

    /// The session id if one was already assigned.
    pub fn session_id(&self) -> Option<&str> {
        self.id.get().map(String::as_str)
    }
}
