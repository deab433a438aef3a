//! Tool invocation with timeout and exponential-backoff retries.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::config::AgentConfig;
use crate::llm::{Message, ToolCall};
use crate::tools::ToolRegistry;

use super::executor::{BoundedExecutor, ExecutorError};
use super::state::{ErrorKind, ErrorRecord};

/// Delay before the retry that follows zero-indexed `attempt`: `0.5 * 2^attempt` seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(500u64.saturating_mul(2u64.saturating_pow(attempt)))
}

/// Runs one tool call through the worker pool, retrying failures.
pub struct RetryingInvoker {
    tools: Arc<ToolRegistry>,
    executor: Arc<BoundedExecutor>,
    deadline: Option<Duration>,
    timeout_secs: f64,
    max_attempts: u32,
}

/// Why a single attempt failed.
enum AttemptFailure {
    TimedOut,
    Failed(String),
}

impl RetryingInvoker {
    pub fn new(tools: Arc<ToolRegistry>, executor: Arc<BoundedExecutor>, config: &AgentConfig) -> Self {
        Self {
            tools,
            executor,
            deadline: config.tool_deadline(),
            timeout_secs: config.tool_execution_timeout,
            max_attempts: config.max_attempts(),
        }
    }

    /// Invoke `call`, returning the tool message for the history and, when
    /// every attempt failed, the terminal error record.
    pub async fn invoke(&self, call: &ToolCall) -> (Message, Option<ErrorRecord>) {
        let Some(tool) = self.tools.get(&call.name) else {
            let available = self.tools.names().join(", ");
            tracing::error!("Unknown tool requested: {}", call.name);
            let content = format!(
                "Unknown tool: '{}'. Available tools: {}.",
                call.name, available
            );
            let record = ErrorRecord::tool(
                &call.name,
                ErrorKind::UnknownTool,
                format!("Unknown tool: {}", call.name),
                1,
            );
            return (Message::tool(&call.id, &call.name, content), Some(record));
        };

        tracing::info!("Executing tool: {}", call.name);

        let mut attempt = 0;
        loop {
            let started = Instant::now();
            let tool = tool.clone();
            let args = call.arguments.clone();
            let outcome = self
                .executor
                .run(async move { tool.execute(args).await }, self.deadline)
                .await;

            let failure = match outcome {
                Ok(Ok(value)) => {
                    tracing::info!(
                        "Tool {} executed successfully in {:.2}s",
                        call.name,
                        started.elapsed().as_secs_f64()
                    );
                    return (Message::tool(&call.id, &call.name, render_result(&value)), None);
                }
                Ok(Err(e)) => AttemptFailure::Failed(e.to_string()),
                Err(ExecutorError::TimedOut(_)) => AttemptFailure::TimedOut,
                Err(e) => AttemptFailure::Failed(e.to_string()),
            };

            match &failure {
                AttemptFailure::TimedOut => tracing::warn!(
                    "Tool {} timed out (attempt {}/{})",
                    call.name,
                    attempt + 1,
                    self.max_attempts
                ),
                AttemptFailure::Failed(e) => tracing::warn!(
                    "Tool {} failed (attempt {}/{}): {}",
                    call.name,
                    attempt + 1,
                    self.max_attempts,
                    e
                ),
            }

            if attempt + 1 >= self.max_attempts {
                return self.terminal_failure(call, failure);
            }

            let wait = backoff_delay(attempt);
            tracing::info!("Retrying {} in {:.1}s...", call.name, wait.as_secs_f64());
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    fn terminal_failure(
        &self,
        call: &ToolCall,
        failure: AttemptFailure,
    ) -> (Message, Option<ErrorRecord>) {
        let attempts = self.max_attempts;
        let (content, record) = match failure {
            AttemptFailure::TimedOut => (
                format!(
                    "Tool '{}' timed out after {} attempts. Each attempt exceeded {}s timeout.",
                    call.name, attempts, self.timeout_secs
                ),
                ErrorRecord::tool(
                    &call.name,
                    ErrorKind::Timeout,
                    format!("Tool execution timed out after {} seconds", self.timeout_secs),
                    attempts,
                ),
            ),
            AttemptFailure::Failed(e) => (
                format!(
                    "Tool '{}' failed after {} attempts. Error: {}. Please try a different \
                     approach or rephrase your query.",
                    call.name, attempts, e
                ),
                ErrorRecord::tool(&call.name, ErrorKind::ToolError, e, attempts),
            ),
        };
        tracing::error!("Tool {} gave up after {} attempts: {}", call.name, attempts, record.error);
        (Message::tool(&call.id, &call.name, content), Some(record))
    }
}

/// Strings go into the history verbatim, everything else as compact JSON.
fn render_result(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
