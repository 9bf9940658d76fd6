//! The seam to the external analysis agent.

use quickframe_types::Dataset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw agent response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Final answer text; expected to hold a JSON payload, possibly wrapped in prose.
    #[serde(default)]
    pub output: Option<String>,
}

impl AgentOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
        }
    }

    /// The trimmed output text, or `EmptyOutput` when there is none.
    pub fn into_text(self) -> Result<String, AgentError> {
        match self.output {
            Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(AgentError::EmptyOutput),
        }
    }
}

/// Why the agent failed to produce any output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("Agent initialization failed: {0}")]
    Initialization(String),

    #[error("Agent execution failed: {0}")]
    Execution(String),

    #[error("Agent timed out")]
    Timeout,

    #[error("Agent returned no output")]
    EmptyOutput,
}

/// An analysis agent that answers a prompt about a dataset.
///
/// Calls block until the agent returns; there is no cancellation.
pub trait DataAgent: Send + Sync {
    fn invoke(&self, dataset: &Dataset, prompt: &str) -> Result<AgentOutput, AgentError>;
}

impl<F> DataAgent for F
where
    F: Fn(&Dataset, &str) -> Result<AgentOutput, AgentError> + Send + Sync,
{
    fn invoke(&self, dataset: &Dataset, prompt: &str) -> Result<AgentOutput, AgentError> {
        self(dataset, prompt)
    }
}
