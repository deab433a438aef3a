//! Configuration management for scholar_agent.
//!
//! Configuration can be set via environment variables:
//! - `LLM_API_KEY` - Required. API key for the chat completion endpoint.
//! - `LLM_BASE_URL` - Optional. OpenAI-compatible base URL. Defaults to `https://openrouter.ai/api/v1`.
//! - `DEFAULT_MODEL` - Optional. Model identifier. Defaults to `anthropic/claude-haiku-4.5`.
//! - `AGENT_MAX_ITERATIONS` - Optional. Reasoning passes before a forced summary. Defaults to `15`.
//! - `AGENT_MAX_EXECUTION_TIME` - Optional. Run time budget in seconds. Defaults to `300`.
//! - `AGENT_TOOL_TIMEOUT` - Optional. Per-call tool timeout in seconds, `0` disables it. Defaults to `30`.
//! - `AGENT_MAX_TOOL_RETRIES` - Optional. Retries after a failed tool call. Defaults to `2`.
//! - `AGENT_MAX_WORKERS` - Optional. Size of the tool worker pool. Defaults to `4`.
//! - `AGENT_SYSTEM_MESSAGE_FILE` - Optional. File whose contents become the system message.
//! - `NEO4J_URI` - Optional. HTTP URI of the knowledge graph; enables the graph tools.
//! - `NEO4J_USERNAME` - Optional. Defaults to `neo4j`.
//! - `NEO4J_PASSWORD` - Required when `NEO4J_URI` is set.
//! - `NEO4J_DATABASE` - Optional. Defaults to `neo4j`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to read {0}: {1}")]
    Unreadable(PathBuf, std::io::Error),
}

/// Limits and behaviour of one agent controller.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Reasoning passes allowed before the forced summary fires
    pub max_iterations: usize,

    /// Wall time budget for one run, in seconds
    pub max_execution_time: f64,

    /// Per-attempt tool timeout in seconds; zero or negative disables it
    pub tool_execution_timeout: f64,

    /// Retries after the first failed attempt of a tool call
    pub max_tool_retries: u32,

    /// Size of the tool worker pool
    pub max_workers: usize,

    /// Prepended to the first model request when no system message is present
    pub system_message: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_execution_time: 300.0,
            tool_execution_timeout: 30.0,
            max_tool_retries: 2,
            max_workers: 4,
            system_message: None,
        }
    }
}

impl AgentConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_execution_time(mut self, seconds: f64) -> Self {
        self.max_execution_time = seconds;
        self
    }

    pub fn with_tool_execution_timeout(mut self, seconds: f64) -> Self {
        self.tool_execution_timeout = seconds;
        self
    }

    pub fn with_max_tool_retries(mut self, retries: u32) -> Self {
        self.max_tool_retries = retries;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    /// Check every field is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be greater than 0"));
        }
        if !(self.max_execution_time.is_finite() && self.max_execution_time > 0.0) {
            return Err(invalid("max_execution_time", "must be a positive number of seconds"));
        }
        if self.tool_execution_timeout.is_nan() {
            return Err(invalid("tool_execution_timeout", "must be a number"));
        }
        if self.max_workers == 0 {
            return Err(invalid("max_workers", "must be greater than 0"));
        }
        Ok(())
    }

    /// Wall-clock budget; values past `Duration::MAX` saturate.
    pub fn execution_budget(&self) -> Duration {
        seconds(self.max_execution_time)
    }

    /// Per-attempt deadline, `None` when timeouts are disabled.
    pub fn tool_deadline(&self) -> Option<Duration> {
        if self.tool_execution_timeout > 0.0 && self.tool_execution_timeout.is_finite() {
            Some(seconds(self.tool_execution_timeout))
        } else {
            None
        }
    }

    /// Total attempts per tool call.
    pub fn max_attempts(&self) -> u32 {
        self.max_tool_retries.saturating_add(1)
    }

    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let system_message = match std::env::var("AGENT_SYSTEM_MESSAGE_FILE") {
            Ok(path) => {
                let path = PathBuf::from(path);
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::Unreadable(path.clone(), e))?;
                Some(text)
            }
            Err(_) => None,
        };
        let config = Self {
            max_iterations: env_parse("AGENT_MAX_ITERATIONS", defaults.max_iterations)?,
            max_execution_time: env_parse("AGENT_MAX_EXECUTION_TIME", defaults.max_execution_time)?,
            tool_execution_timeout: env_parse(
                "AGENT_TOOL_TIMEOUT",
                defaults.tool_execution_timeout,
            )?,
            max_tool_retries: env_parse("AGENT_MAX_TOOL_RETRIES", defaults.max_tool_retries)?,
            max_workers: env_parse("AGENT_MAX_WORKERS", defaults.max_workers)?,
            system_message,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Knowledge graph connection settings.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the chat completion endpoint
    pub api_key: String,

    /// OpenAI-compatible base URL
    pub base_url: String,

    /// Default LLM model identifier
    pub default_model: String,

    /// Agent limits
    pub agent: AgentConfig,

    /// Graph settings, when the graph tools are enabled
    pub graph: Option<GraphConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `LLM_API_KEY` is not set, or if
    /// `NEO4J_URI` is set without `NEO4J_PASSWORD`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("LLM_API_KEY".to_string()))?;

        let base_url = std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string());

        let default_model = std::env::var("DEFAULT_MODEL")
            .unwrap_or_else(|_| "anthropic/claude-haiku-4.5".to_string());

        let graph = match std::env::var("NEO4J_URI") {
            Ok(uri) => Some(GraphConfig {
                uri,
                username: std::env::var("NEO4J_USERNAME").unwrap_or_else(|_| "neo4j".to_string()),
                password: std::env::var("NEO4J_PASSWORD")
                    .map_err(|_| ConfigError::MissingEnvVar("NEO4J_PASSWORD".to_string()))?,
                database: std::env::var("NEO4J_DATABASE").unwrap_or_else(|_| "neo4j".to_string()),
            }),
            Err(_) => None,
        };

        Ok(Self {
            api_key,
            base_url,
            default_model,
            agent: AgentConfig::from_env()?,
            graph,
        })
    }
}

fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue(field.to_string(), reason.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}
