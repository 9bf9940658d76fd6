//! Query memoization, conversation history and popularity tracking for Quickframe.

mod agent;
mod db;
mod error;
mod fingerprint;
mod memo;
mod parser;
mod process;
mod prompt;
mod session;

pub use agent::{AgentError, AgentOutput, DataAgent};
pub use db::MemoryStore;
pub use error::QuickframeError;
pub use fingerprint::{hash_dataset, hash_question};
pub use memo::{AnswerSource, MemoConfig, QueryMemo, QueryOptions, QueryOutcome};
pub use parser::{extract_json_block, parse_agent_output, OutputError};
pub use process::CommandAgent;
pub use prompt::build_prompt;
pub use session::{new_session_id, SessionContext};

/// Result type for Quickframe operations.
pub type Result<T> = std::result::Result<T, QuickframeError>;
