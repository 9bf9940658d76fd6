//! Best-effort extraction of a structured payload from agent output.
//!
//! Agents are asked for bare JSON but often wrap it in prose or code fences.
//! All of the heuristics live here so the coordinator only sees a
//! `Result<StructuredResult, OutputError>`.

use once_cell::sync::Lazy;
use quickframe_types::StructuredResult;
use regex::Regex;
use serde_json::Value;

/// Widest span from the first `{` to the last `}`.
static GREEDY_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Why agent output could not be turned into a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputError {
    /// No JSON-looking block in the text.
    NotJson,
    /// A block was found but none of the candidates parsed.
    MalformedFragment,
    /// Valid JSON, but not a mapping.
    NotAnObject,
}

/// Parse agent output into a payload.
///
/// Tries the whole text first, then embedded blocks found by [`extract_json_block`].
pub fn parse_agent_output(output: &str) -> Result<StructuredResult, OutputError> {
    let trimmed = output.trim();

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(_) => {
            let candidates = block_candidates(trimmed);
            if candidates.is_empty() {
                return Err(OutputError::NotJson);
            }
            candidates
                .into_iter()
                .find_map(|block| serde_json::from_str::<Value>(block).ok())
                .ok_or(OutputError::MalformedFragment)?
        }
    };

    match value {
        Value::Object(map) => Ok(StructuredResult::from(map)),
        _ => Err(OutputError::NotAnObject),
    }
}

/// Find the first embedded JSON object in free text.
///
/// Prefers the first brace-balanced block; falls back to the widest
/// first-`{`-to-last-`}` span.
pub fn extract_json_block(text: &str) -> Option<&str> {
    block_candidates(text).into_iter().next()
}

fn block_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    if let Some(block) = balanced_block(text) {
        candidates.push(block);
    }
    if let Some(m) = GREEDY_BLOCK.find(text) {
        if !candidates.contains(&m.as_str()) {
            candidates.push(m.as_str());
        }
    }
    candidates
}

/// Scan from the first `{` to its matching `}`, skipping braces inside strings.
fn balanced_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
