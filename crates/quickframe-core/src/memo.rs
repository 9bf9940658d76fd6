//! Memoization coordinator wrapping the analysis agent.
//!
//! A query flows through these states:
//!
//! ```text
//! START -> CACHE_CHECK -> CACHE_HIT_VALID   -> RETURN
//!                      -> CACHE_HIT_CORRUPT -> AGENT_CALL
//!                      -> CACHE_MISS        -> AGENT_CALL
//! AGENT_CALL -> SUCCESS_STRUCTURED   -> LOG + CACHE + RETURN
//!            -> SUCCESS_UNSTRUCTURED -> LOG + RETURN
//!            -> FAILURE              -> LOG + RETURN
//! ```
//!
//! Every terminal state yields a payload. Only store errors reach the caller.

use crate::agent::{AgentError, DataAgent};
use crate::db::MemoryStore;
use crate::fingerprint::{hash_dataset, hash_question};
use crate::parser::{parse_agent_output, OutputError};
use crate::prompt::build_prompt;
use crate::Result;
use quickframe_types::{truncate_chars, Dataset, StructuredResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const INIT_FAILURE_MESSAGE: &str =
    "The analysis agent could not be initialized. Please try again later.";
pub const EMPTY_OUTPUT_MESSAGE: &str = "The analysis failed. Please try again.";
pub const EXECUTION_FAILURE_MESSAGE: &str =
    "An error occurred during analysis. Please try again.";
pub const TIMEOUT_MESSAGE: &str = "The analysis took too long. Please try again.";
pub const UNEXPECTED_SHAPE_MESSAGE: &str =
    "Analysis finished, but the result was not in the expected format.";

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct MemoConfig {
    /// Characters of raw agent output quoted in unparseable-output fallbacks.
    pub excerpt_chars: usize,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self { excerpt_chars: 100 }
    }
}

/// Per-query switches.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions<'a> {
    /// Consult the quick-answer cache before calling the agent.
    pub use_cache: bool,
    /// Log the query to this session's history.
    pub session_id: Option<&'a str>,
}

impl Default for QueryOptions<'_> {
    fn default() -> Self {
        Self {
            use_cache: true,
            session_id: None,
        }
    }
}

impl<'a> QueryOptions<'a> {
    pub fn session(session_id: &'a str) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::default()
        }
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AnswerSource {
    /// Served from the quick-answer cache without calling the agent.
    Cache { hit_count: u32 },
    /// Parsed from a successful agent response.
    Agent,
    /// Synthesized after an agent or output-format failure.
    Fallback,
}

/// A query's payload plus how it was produced.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub result: StructuredResult,
    pub source: AnswerSource,
    /// Seconds spent answering.
    pub response_time: f64,
}

/// Why the agent path produced no usable payload.
#[derive(Debug)]
enum QueryFailure {
    Agent(AgentError),
    Output { error: OutputError, raw: String },
}

/// Wraps an agent call with a persistent quick-answer cache and session history.
pub struct QueryMemo {
    store: Arc<MemoryStore>,
    config: MemoConfig,
}

impl QueryMemo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self::with_config(store, MemoConfig::default())
    }

    pub fn with_config(store: Arc<MemoryStore>, config: MemoConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Answer a question about a dataset, serving from cache when possible.
    pub fn answer_query(
        &self,
        dataset: &Dataset,
        question: &str,
        agent: &dyn DataAgent,
        options: QueryOptions<'_>,
    ) -> Result<StructuredResult> {
        self.answer_query_detailed(dataset, question, agent, options)
            .map(|outcome| outcome.result)
    }

    /// Like [`answer_query`](Self::answer_query), also reporting the answer's source and latency.
    pub fn answer_query_detailed(
        &self,
        dataset: &Dataset,
        question: &str,
        agent: &dyn DataAgent,
        options: QueryOptions<'_>,
    ) -> Result<QueryOutcome> {
        let started = Instant::now();
        let data_hash = hash_dataset(dataset);
        let question_hash = hash_question(question);

        if options.use_cache {
            if let Some(cached) = self.store.lookup_quick_answer(&question_hash, &data_hash)? {
                match StructuredResult::from_json(&cached.answer) {
                    Ok(result) => {
                        let response_time = started.elapsed().as_secs_f64();
                        info!(
                            target: "quickframe::cache",
                            "Cache hit for {} (hits: {})",
                            question_hash, cached.hit_count
                        );
                        if let Some(session_id) = options.session_id {
                            self.store.insert_conversation(
                                session_id,
                                question,
                                &cached.answer,
                                &data_hash,
                                response_time,
                            )?;
                        }
                        return Ok(QueryOutcome {
                            result,
                            source: AnswerSource::Cache {
                                hit_count: cached.hit_count,
                            },
                            response_time,
                        });
                    }
                    Err(e) => {
                        warn!(
                            target: "quickframe::cache",
                            "Cached answer for {} is corrupt, recomputing: {}",
                            question_hash, e
                        );
                    }
                }
            } else {
                debug!(target: "quickframe::cache", "Cache miss for {}", question_hash);
            }
        }

        let prompt = build_prompt(dataset, question);
        let (result, source) = match Self::run_agent(agent, dataset, &prompt) {
            Ok(result) => (result, AnswerSource::Agent),
            Err(failure) => {
                warn!(target: "quickframe::agent", "Agent query failed: {:?}", failure);
                (self.fallback_payload(&failure), AnswerSource::Fallback)
            }
        };

        let response_time = started.elapsed().as_secs_f64();
        let answer_json = result.to_json()?;

        if let Some(session_id) = options.session_id {
            self.store.insert_conversation(
                session_id,
                question,
                &answer_json,
                &data_hash,
                response_time,
            )?;
        }

        if source == AnswerSource::Agent {
            if result.is_cacheable() {
                self.store
                    .upsert_quick_answer(&question_hash, &data_hash, question, &answer_json)?;
            } else {
                debug!(
                    target: "quickframe::cache",
                    "Payload for {} has no recognized result kind, not caching",
                    question_hash
                );
            }
        }

        Ok(QueryOutcome {
            result,
            source,
            response_time,
        })
    }

    fn run_agent(
        agent: &dyn DataAgent,
        dataset: &Dataset,
        prompt: &str,
    ) -> std::result::Result<StructuredResult, QueryFailure> {
        let text = agent
            .invoke(dataset, prompt)
            .and_then(|output| output.into_text())
            .map_err(QueryFailure::Agent)?;

        parse_agent_output(&text).map_err(|error| QueryFailure::Output { error, raw: text })
    }

    fn fallback_payload(&self, failure: &QueryFailure) -> StructuredResult {
        match failure {
            QueryFailure::Agent(AgentError::Initialization(_)) => {
                StructuredResult::text(INIT_FAILURE_MESSAGE)
            }
            QueryFailure::Agent(AgentError::Execution(_)) => {
                StructuredResult::text(EXECUTION_FAILURE_MESSAGE)
            }
            QueryFailure::Agent(AgentError::Timeout) => StructuredResult::text(TIMEOUT_MESSAGE),
            QueryFailure::Agent(AgentError::EmptyOutput) => {
                StructuredResult::text(EMPTY_OUTPUT_MESSAGE)
            }
            QueryFailure::Output {
                error: OutputError::NotAnObject,
                ..
            } => StructuredResult::text(UNEXPECTED_SHAPE_MESSAGE),
            QueryFailure::Output {
                error: OutputError::MalformedFragment,
                raw,
            } => StructuredResult::text(format!(
                "Analysis finished, but the result format was invalid: {}...",
                truncate_chars(raw, self.config.excerpt_chars)
            )),
            QueryFailure::Output {
                error: OutputError::NotJson,
                raw,
            } => StructuredResult::text(format!(
                "Analysis result: {}...",
                truncate_chars(raw, self.config.excerpt_chars)
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentOutput;
    use quickframe_types::{Column, ColumnType, Fingerprint};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const TOP_REGIONS: &str = "Top 5 regions by sales";
    const TABLE_OUTPUT: &str =
        r#"{"table": {"columns": ["region", "sales"], "data": [["East", 500]]}}"#;

    /// Agent that replies with a fixed result and counts its calls.
    struct ScriptedAgent {
        reply: std::result::Result<AgentOutput, AgentError>,
        calls: AtomicUsize,
    }

    impl ScriptedAgent {
        fn output(text: &str) -> Self {
            Self::reply(Ok(AgentOutput::new(text)))
        }

        fn reply(reply: std::result::Result<AgentOutput, AgentError>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DataAgent for ScriptedAgent {
        fn invoke(
            &self,
            _dataset: &Dataset,
            _prompt: &str,
        ) -> std::result::Result<AgentOutput, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn create_memo() -> (QueryMemo, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryStore::open(&temp_dir.path().join("memory.db")).unwrap();
        (QueryMemo::new(Arc::new(store)), temp_dir)
    }

    fn sales_dataset(rows: usize) -> Dataset {
        Dataset::new(
            vec![
                Column::new("region", ColumnType::Object),
                Column::new("sales", ColumnType::Int64),
            ],
            (0..rows).map(|i| vec![json!(format!("r{}", i)), json!(i)]).collect(),
        )
    }

    fn keys(dataset: &Dataset, question: &str) -> (Fingerprint, Fingerprint) {
        (hash_question(question), hash_dataset(dataset))
    }

    #[test]
    fn test_second_call_served_from_cache() {
        let (memo, _dir) = create_memo();
        let dataset = sales_dataset(100);
        let agent = ScriptedAgent::output(TABLE_OUTPUT);

        let first = memo
            .answer_query_detailed(&dataset, TOP_REGIONS, &agent, QueryOptions::default())
            .unwrap();
        assert_eq!(first.source, AnswerSource::Agent);
        assert_eq!(first.result.table().unwrap().data[0][0], json!("East"));

        let (q, d) = keys(&dataset, TOP_REGIONS);
        assert_eq!(memo.store().quick_answer(&q, &d).unwrap().unwrap().hit_count, 1);

        let second = memo
            .answer_query_detailed(&dataset, TOP_REGIONS, &agent, QueryOptions::default())
            .unwrap();
        assert_eq!(second.source, AnswerSource::Cache { hit_count: 2 });
        assert_eq!(second.result, first.result);
        assert_eq!(agent.calls(), 1);
        assert_eq!(memo.store().quick_answer(&q, &d).unwrap().unwrap().hit_count, 2);
    }

    #[test]
    fn test_cache_shared_across_same_schema_datasets() {
        let (memo, _dir) = create_memo();
        let agent = ScriptedAgent::output(TABLE_OUTPUT);

        let mut other_values = sales_dataset(3);
        memo.answer_query(&sales_dataset(3), TOP_REGIONS, &agent, QueryOptions::default())
            .unwrap();
        other_values.rows[0][0] = json!("changed");
        memo.answer_query(&other_values, "top 5 regions by SALES ", &agent, QueryOptions::default())
            .unwrap();

        assert_eq!(agent.calls(), 1);
    }

    #[test]
    fn test_bypassing_cache_replaces_entry() {
        let (memo, _dir) = create_memo();
        let dataset = sales_dataset(10);
        let (q, d) = keys(&dataset, TOP_REGIONS);

        let old = ScriptedAgent::output(r#"{"answer": "old"}"#);
        memo.answer_query(&dataset, TOP_REGIONS, &old, QueryOptions::default())
            .unwrap();
        memo.answer_query(&dataset, TOP_REGIONS, &old, QueryOptions::default())
            .unwrap();
        assert_eq!(memo.store().quick_answer(&q, &d).unwrap().unwrap().hit_count, 2);

        let new = ScriptedAgent::output(r#"{"answer": "new"}"#);
        let result = memo
            .answer_query(&dataset, TOP_REGIONS, &new, QueryOptions::default().without_cache())
            .unwrap();
        assert_eq!(result.answer(), Some("new"));
        assert_eq!(new.calls(), 1);

        let row = memo.store().quick_answer(&q, &d).unwrap().unwrap();
        assert_eq!(row.hit_count, 1);
        assert_eq!(row.answer, r#"{"answer":"new"}"#);
    }

    #[test]
    fn test_hits_logged_to_session() {
        let (memo, _dir) = create_memo();
        let dataset = sales_dataset(5);
        let agent = ScriptedAgent::output(TABLE_OUTPUT);

        memo.answer_query(&dataset, TOP_REGIONS, &agent, QueryOptions::session("s1"))
            .unwrap();
        memo.answer_query(&dataset, TOP_REGIONS, &agent, QueryOptions::session("s1"))
            .unwrap();
        memo.answer_query(&dataset, TOP_REGIONS, &agent, QueryOptions::default())
            .unwrap();

        let history = memo.store().recent_conversations("s1", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.question == TOP_REGIONS));
        assert_eq!(history[0].parsed_answer(), history[1].parsed_answer());
        assert_eq!(memo.store().total_conversations().unwrap(), 2);
    }

    #[test]
    fn test_corrupt_cache_entry_recomputed() {
        let (memo, _dir) = create_memo();
        let dataset = sales_dataset(5);
        let (q, d) = keys(&dataset, TOP_REGIONS);
        memo.store()
            .upsert_quick_answer(&q, &d, TOP_REGIONS, "not json at all")
            .unwrap();

        let agent = ScriptedAgent::output(r#"{"answer": "fresh"}"#);
        let outcome = memo
            .answer_query_detailed(&dataset, TOP_REGIONS, &agent, QueryOptions::default())
            .unwrap();

        assert_eq!(outcome.source, AnswerSource::Agent);
        assert_eq!(outcome.result.answer(), Some("fresh"));
        assert_eq!(agent.calls(), 1);
        let row = memo.store().quick_answer(&q, &d).unwrap().unwrap();
        assert_eq!(row.answer, r#"{"answer":"fresh"}"#);
    }

    #[test]
    fn test_unrecognized_payload_logged_not_cached() {
        let (memo, _dir) = create_memo();
        let dataset = sales_dataset(5);
        let agent = ScriptedAgent::output(r#"{"note": "nothing useful"}"#);

        let result = memo
            .answer_query(&dataset, TOP_REGIONS, &agent, QueryOptions::session("s1"))
            .unwrap();
        assert!(!result.is_cacheable());
        assert_eq!(result.extra()["note"], json!("nothing useful"));

        let (q, d) = keys(&dataset, TOP_REGIONS);
        assert!(memo.store().lookup_quick_answer(&q, &d).unwrap().is_none());
        assert_eq!(memo.store().count_conversations("s1").unwrap(), 1);

        memo.answer_query(&dataset, TOP_REGIONS, &agent, QueryOptions::default())
            .unwrap();
        assert_eq!(agent.calls(), 2);
    }

    #[test]
    fn test_agent_exception_returns_fixed_message() {
        let (memo, _dir) = create_memo();
        let dataset = sales_dataset(5);
        let agent = ScriptedAgent::reply(Err(AgentError::Execution("KeyError: 'sales'".into())));

        let outcome = memo
            .answer_query_detailed(&dataset, TOP_REGIONS, &agent, QueryOptions::session("s1"))
            .unwrap();
        assert_eq!(outcome.source, AnswerSource::Fallback);
        assert_eq!(outcome.result, StructuredResult::text(EXECUTION_FAILURE_MESSAGE));

        let history = memo.store().recent_conversations("s1", 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].parsed_answer().unwrap().answer(),
            Some(EXECUTION_FAILURE_MESSAGE)
        );

        let (q, d) = keys(&dataset, TOP_REGIONS);
        assert!(memo.store().quick_answer(&q, &d).unwrap().is_none());
    }

    #[test]
    fn test_failure_categories() {
        let (memo, _dir) = create_memo();
        let dataset = sales_dataset(1);
        let cases = [
            (Err(AgentError::Initialization("no key".into())), INIT_FAILURE_MESSAGE),
            (Err(AgentError::Timeout), TIMEOUT_MESSAGE),
            (Ok(AgentOutput::default()), EMPTY_OUTPUT_MESSAGE),
            (Ok(AgentOutput::new("[1, 2]")), UNEXPECTED_SHAPE_MESSAGE),
        ];

        for (reply, expected) in cases {
            let agent = ScriptedAgent::reply(reply);
            let result = memo
                .answer_query(&dataset, "q", &agent, QueryOptions::default())
                .unwrap();
            assert_eq!(result.answer(), Some(expected));
        }
        assert_eq!(memo.store().count_quick_answers(&hash_dataset(&dataset)).unwrap(), 0);
    }

    #[test]
    fn test_unparseable_output_quotes_excerpt() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryStore::open(&temp_dir.path().join("memory.db")).unwrap();
        let memo = QueryMemo::with_config(Arc::new(store), MemoConfig { excerpt_chars: 10 });
        let dataset = sales_dataset(1);

        let prose = ScriptedAgent::output("East has the highest sales overall.");
        let result = memo
            .answer_query(&dataset, "q", &prose, QueryOptions::session("s1"))
            .unwrap();
        assert_eq!(result.answer(), Some("Analysis result: East has t..."));

        let broken = ScriptedAgent::output("Here you go: {answer: East}");
        let result = memo
            .answer_query(&dataset, "q", &broken, QueryOptions::default())
            .unwrap();
        assert_eq!(
            result.answer(),
            Some("Analysis finished, but the result format was invalid: Here you g...")
        );

        assert_eq!(memo.store().count_conversations("s1").unwrap(), 1);
        assert_eq!(memo.store().count_quick_answers(&hash_dataset(&dataset)).unwrap(), 0);
    }

    #[test]
    fn test_embedded_json_is_cached() {
        let (memo, _dir) = create_memo();
        let dataset = sales_dataset(2);
        let agent = ScriptedAgent::output(
            "Final Answer: {\"line\": {\"columns\": [\"Jan\", \"Feb\"], \"data\": [1, 2]}}",
        );

        let result = memo
            .answer_query(&dataset, "monthly trend", &agent, QueryOptions::default())
            .unwrap();
        assert_eq!(result.line().unwrap().columns, vec!["Jan", "Feb"]);

        let (q, d) = keys(&dataset, "monthly trend");
        assert!(memo.store().quick_answer(&q, &d).unwrap().is_some());
    }

    #[test]
    fn test_malformed_dataset_still_answers() {
        let (memo, _dir) = create_memo();
        let mut dataset = sales_dataset(2);
        dataset.rows.push(vec![json!("ragged")]);
        let agent = ScriptedAgent::output(r#"{"answer": "ok"}"#);

        memo.answer_query(&dataset, "q", &agent, QueryOptions::default())
            .unwrap();

        let sentinel = Fingerprint::unknown();
        assert_eq!(memo.store().count_quick_answers(&sentinel).unwrap(), 1);
    }

    #[test]
    fn test_prompt_passed_to_agent() {
        let (memo, _dir) = create_memo();
        let dataset = sales_dataset(4);
        let agent = |_: &Dataset, prompt: &str| -> std::result::Result<AgentOutput, AgentError> {
            assert!(prompt.contains("Dataset: 4 rows, 2 columns"));
            assert!(prompt.ends_with("Question: how many rows?"));
            Ok(AgentOutput::new(r#"{"answer": "4"}"#))
        };

        let result = memo
            .answer_query(&dataset, "how many rows?", &agent, QueryOptions::default())
            .unwrap();
        assert_eq!(result.answer(), Some("4"));
    }
}
