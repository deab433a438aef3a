//! Concurrent dispatch of the tool calls requested in one turn.

use futures::future::join_all;

use crate::llm::{AiMessage, Message};

use super::retry::RetryingInvoker;
use super::state::ErrorRecord;

/// Output of one tools pass.
#[derive(Debug, Default)]
pub struct ToolStageOutput {
    /// One tool message per call, in call order
    pub messages: Vec<Message>,
    pub errors: Vec<ErrorRecord>,
}

pub struct ToolExecutionStage {
    invoker: RetryingInvoker,
}

impl ToolExecutionStage {
    pub fn new(invoker: RetryingInvoker) -> Self {
        Self { invoker }
    }

    /// Execute every tool call of `ai` concurrently and wait for all of them.
    pub async fn run(&self, ai: &AiMessage) -> ToolStageOutput {
        if !ai.has_tool_calls() {
            tracing::warn!("Tools stage reached but the last AI message has no tool calls");
            return ToolStageOutput::default();
        }

        for call in &ai.tool_calls {
            tracing::debug!("  - {}({})", call.name, call.arguments);
        }

        // join_all yields results in input order whatever order they finish in.
        let results = join_all(ai.tool_calls.iter().map(|call| self.invoker.invoke(call))).await;

        let mut output = ToolStageOutput::default();
        for (message, error) in results {
            output.messages.push(message);
            output.errors.extend(error);
        }
        output
    }
}
