//! # Scholar Agent
//!
//! A tool-using reasoning agent for questions about research papers.
//!
//! This library provides:
//! - A reasoning/tool loop with iteration and wall-clock budgets
//! - A bounded worker pool with per-call deadlines and retries
//! - Tools for arithmetic and for querying a Neo4j knowledge graph
//! - An OpenAI-compatible chat client
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scholar_agent::{agent::AgentController, config::Config, llm::OpenAiCompatibleClient, tools::ToolRegistry};
//!
//! let config = Config::from_env()?;
//! let llm = Arc::new(OpenAiCompatibleClient::new(&config.base_url, &config.api_key, &config.default_model));
//! let agent = AgentController::new(llm, ToolRegistry::with_arithmetic(), config.agent)?;
//! let state = agent.invoke("What is 2 + 3?", "run-1").await?;
//! println!("{}", state.final_answer().unwrap_or_default());
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod tools;

pub use config::Config;
