//! Server configuration.

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Executable answering analysis prompts.
    #[serde(default = "default_agent_command")]
    pub agent_command: PathBuf,
    #[serde(default)]
    pub agent_args: Vec<String>,
    /// Conversations returned by the history route when no limit is given.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Questions returned by the popular route when no limit is given.
    #[serde(default = "default_popular_limit")]
    pub popular_limit: usize,
    /// Characters of raw agent output quoted when it cannot be parsed.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8501
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quickframe")
        .join("memory.db")
}

fn default_agent_command() -> PathBuf {
    PathBuf::from("quickframe-agent")
}

fn default_history_limit() -> usize {
    10
}

fn default_popular_limit() -> usize {
    5
}

fn default_excerpt_chars() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            agent_command: default_agent_command(),
            agent_args: Vec::new(),
            history_limit: default_history_limit(),
            popular_limit: default_popular_limit(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        Ok(Config::default())
    }
}
