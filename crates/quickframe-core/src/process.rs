//! Subprocess-backed analysis agent.

use crate::agent::{AgentError, AgentOutput, DataAgent};
use quickframe_types::{truncate_chars, Dataset};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, error, info, warn};

/// Maximum number of stderr characters carried into an execution error.
const STDERR_EXCERPT_CHARS: usize = 200;

/// Request written to the agent's stdin as a single JSON document.
#[derive(Serialize)]
struct AgentRequest<'a> {
    prompt: &'a str,
    dataset: &'a Dataset,
}

/// Runs an external command per query.
///
/// The command receives `{"prompt": ..., "dataset": ...}` on stdin and must
/// print its final answer on stdout.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandAgent {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl DataAgent for CommandAgent {
    fn invoke(&self, dataset: &Dataset, prompt: &str) -> Result<AgentOutput, AgentError> {
        let request = serde_json::to_vec(&AgentRequest { prompt, dataset })
            .map_err(|e| AgentError::Initialization(format!("Failed to encode request: {}", e)))?;

        info!(target: "quickframe::agent", "Spawning agent process: {:?}", self.program);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!(target: "quickframe::agent", "Failed to spawn agent process: {}", e);
                AgentError::Initialization(format!("Failed to spawn: {}", e))
            })?;

        // Write stdin from its own thread so a chatty child can't deadlock on a full stdout pipe
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || {
                if let Err(e) = stdin.write_all(&request) {
                    warn!(target: "quickframe::agent", "Failed to write agent request: {}", e);
                }
            })
        });

        let output = child
            .wait_with_output()
            .map_err(|e| AgentError::Execution(format!("Failed to wait for agent: {}", e)))?;

        if let Some(writer) = writer {
            let _ = writer.join();
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(target: "quickframe::agent", "Agent exited with {}: {}", output.status, stderr.trim());
            return Err(AgentError::Execution(format!(
                "Agent exited with {}: {}",
                output.status,
                truncate_chars(stderr.trim(), STDERR_EXCERPT_CHARS)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(target: "quickframe::agent", "Agent stdout: {}", stdout.trim());
        Ok(AgentOutput {
            output: Some(stdout),
        })
    }
}
