//! Per-run state threaded through the agent loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::llm::{AiMessage, Message};

/// Stage of the loop an error was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Reasoning,
    Tools,
}

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The model asked for a tool that is not registered
    UnknownTool,
    /// Every attempt exceeded the tool timeout
    Timeout,
    /// The tool returned an error (or panicked) on every attempt
    ToolError,
    /// The model invocation itself failed
    ModelError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTool => write!(f, "unknown_tool"),
            Self::Timeout => write!(f, "timeout"),
            Self::ToolError => write!(f, "tool_error"),
            Self::ModelError => write!(f, "model_error"),
        }
    }
}

/// A recovered failure, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub stage: Stage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    pub kind: ErrorKind,

    pub error: String,

    /// Attempts made before giving up
    pub attempts: u32,

    pub timestamp: DateTime<Utc>,

    /// Reasoning iteration the error happened in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,
}

impl ErrorRecord {
    pub fn tool(name: &str, kind: ErrorKind, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            stage: Stage::Tools,
            tool: Some(name.to_string()),
            kind,
            error: error.into(),
            attempts,
            timestamp: Utc::now(),
            iteration: None,
        }
    }

    pub fn reasoning(error: impl Into<String>, iteration: usize) -> Self {
        Self {
            stage: Stage::Reasoning,
            tool: None,
            kind: ErrorKind::ModelError,
            error: error.into(),
            attempts: 1,
            timestamp: Utc::now(),
            iteration: Some(iteration),
        }
    }
}

/// State owned by one run.
#[derive(Debug, Clone)]
pub struct AgentState {
    /// Caller-supplied run (thread) identifier
    pub run_id: String,

    /// Conversation history, append-only within a run
    pub messages: Vec<Message>,

    /// Completed reasoning passes
    pub iteration_count: usize,

    /// Monotonic run start, used for the time budget
    pub start_time: Instant,

    /// Wall-clock run start, for reporting
    pub started_at: DateTime<Utc>,

    /// Recovered errors, append-only
    pub errors: Vec<ErrorRecord>,
}

impl AgentState {
    /// Fresh state whose history is `history` followed by the user's input.
    pub fn new(run_id: impl Into<String>, history: Vec<Message>, input: &str) -> Self {
        let mut messages = history;
        messages.push(Message::human(input));
        Self {
            run_id: run_id.into(),
            messages,
            iteration_count: 0,
            start_time: Instant::now(),
            started_at: Utc::now(),
            errors: Vec::new(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Most recent message, if it is an AI message.
    pub fn last_ai_message(&self) -> Option<&AiMessage> {
        self.messages.last().and_then(Message::as_ai)
    }

    /// Text of the last AI message, i.e. the answer once the run is done.
    pub fn final_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find_map(Message::as_ai)
            .map(|ai| ai.content.as_str())
    }

    pub fn has_system_message(&self) -> bool {
        self.messages.iter().any(Message::is_system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_state_starts_at_zero_with_input_last() {
        let state = AgentState::new("run-1", vec![Message::system("sys")], "who wrote BERT?");
        assert_eq!(state.iteration_count, 0);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1], Message::human("who wrote BERT?"));
        assert!(state.has_system_message());
        assert!(state.errors.is_empty());
        assert!(state.last_ai_message().is_none());
    }

    #[test]
    fn final_answer_reads_last_ai_message() {
        let mut state = AgentState::new("run-1", Vec::new(), "q");
        state.messages.push(AiMessage::text("draft").into());
        state.messages.push(Message::tool("c1", "add_numbers", "3"));
        assert!(state.last_ai_message().is_none());
        assert_eq!(state.final_answer(), Some("draft"));
    }

    #[test]
    fn error_record_serializes_kind_in_snake_case() {
        let record = ErrorRecord::tool("search_nodes", ErrorKind::UnknownTool, "nope", 1);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["stage"], json!("tools"));
        assert_eq!(value["kind"], json!("unknown_tool"));
        assert_eq!(value["attempts"], json!(1));
        assert!(value.get("iteration").is_none());
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
    }
}
