//! Shared application state.

use crate::config::Config;
use quickframe_core::{CommandAgent, DataAgent, MemoConfig, MemoryStore, QueryMemo};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub memo: Arc<QueryMemo>,
    pub agent: Arc<dyn DataAgent>,
    pub config: Config,
}

impl AppState {
    /// Open the store at `config.db_path` and answer with the configured command.
    pub fn new(config: Config) -> quickframe_core::Result<Self> {
        let agent = CommandAgent::new(config.agent_command.clone(), config.agent_args.clone());
        Self::with_agent(config, Arc::new(agent))
    }

    pub fn with_agent(config: Config, agent: Arc<dyn DataAgent>) -> quickframe_core::Result<Self> {
        let store = Arc::new(MemoryStore::open(&config.db_path)?);
        let memo_config = MemoConfig {
            excerpt_chars: config.excerpt_chars,
        };
        let memo = Arc::new(QueryMemo::with_config(store, memo_config));

        Ok(Self {
            memo,
            agent,
            config,
        })
    }
}
