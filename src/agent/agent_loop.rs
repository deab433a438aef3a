//! Core agent loop implementation.

use std::sync::Arc;

use futures::Stream;
use serde::Serialize;
use thiserror::Error;

use crate::config::{AgentConfig, ConfigError};
use crate::llm::{AiMessage, LlmClient, Message};
use crate::tools::ToolRegistry;

use super::checkpoint::{CheckpointError, Checkpointer, RunSnapshot};
use super::executor::BoundedExecutor;
use super::reasoning::{ReasoningOutcome, ReasoningStage};
use super::retry::RetryingInvoker;
use super::state::{AgentState, ErrorRecord};
use super::tool_stage::ToolExecutionStage;

/// Errors that end a run instead of being recovered inside it.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent has been shut down")]
    ShutDown,

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Incremental output of a run, one per completed stage.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum AgentUpdate {
    Reasoning {
        message: AiMessage,
        outcome: ReasoningOutcome,
        iteration_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorRecord>,
    },
    Tools {
        messages: Vec<Message>,
        errors: Vec<ErrorRecord>,
    },
}

impl AgentUpdate {
    /// Human-readable rendering for terminals.
    pub fn render(&self) -> String {
        match self {
            AgentUpdate::Reasoning { message, .. } if message.has_tool_calls() => message
                .tool_calls
                .iter()
                .map(|tc| format!("Calling tool: {} with args: {}\n", tc.name, tc.arguments))
                .collect(),
            AgentUpdate::Reasoning { message, .. } => {
                format!("Final answer:\n\n{}\n", message.content)
            }
            AgentUpdate::Tools { messages, errors } => {
                let mut out = String::new();
                for error in errors {
                    out.push_str(&format!(
                        "{} encountered an issue: {}\n",
                        error.tool.as_deref().unwrap_or("unknown"),
                        error.error
                    ));
                }
                for message in messages {
                    if let Message::Tool { name, content, .. } = message {
                        out.push_str(&format!(
                            "Tool result: {} -> {}\n",
                            name,
                            truncate_for_display(content, 500)
                        ));
                    }
                }
                out
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Reasoning,
    Tools,
    Done,
}

/// Stages and resources shared by every run of one controller.
struct LoopCore {
    reasoning: ReasoningStage,
    tools: ToolExecutionStage,
    executor: Arc<BoundedExecutor>,
}

impl LoopCore {
    /// Run the stage for `phase` and return the next phase.
    async fn step(&self, phase: Phase, state: &mut AgentState) -> (Phase, Option<AgentUpdate>) {
        match phase {
            Phase::Reasoning => {
                let output = self.reasoning.run(state).await;
                let next = if output.message.has_tool_calls() {
                    Phase::Tools
                } else {
                    Phase::Done
                };
                let update = AgentUpdate::Reasoning {
                    message: output.message,
                    outcome: output.outcome,
                    iteration_count: state.iteration_count,
                    error: output.error,
                };
                (next, Some(update))
            }
            Phase::Tools => {
                let ai = state.last_ai_message().cloned().unwrap_or_default();
                let output = self.tools.run(&ai).await;
                state.messages.extend(output.messages.iter().cloned());
                state.errors.extend(output.errors.iter().cloned());
                let update = AgentUpdate::Tools {
                    messages: output.messages,
                    errors: output.errors,
                };
                (Phase::Reasoning, Some(update))
            }
            Phase::Done => (Phase::Done, None),
        }
    }
}

/// The autonomous agent: alternates reasoning and tool execution until the
/// model answers or a budget runs out.
#[derive(Clone)]
pub struct AgentController {
    core: Arc<LoopCore>,
    config: Arc<AgentConfig>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl AgentController {
    /// Create a controller over `llm` and `tools`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a config field is out of range.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        config: AgentConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = Arc::new(config);
        let schemas = tools.get_tool_schemas();
        let tool_count = schemas.len();
        let tools = Arc::new(tools);
        let executor = Arc::new(BoundedExecutor::new(config.max_workers));

        let invoker = RetryingInvoker::new(tools, executor.clone(), &config);
        let core = LoopCore {
            reasoning: ReasoningStage::new(llm, schemas, config.clone()),
            tools: ToolExecutionStage::new(invoker),
            executor,
        };

        tracing::info!("Agent initialized with {} tools", tool_count);

        Ok(Self {
            core: Arc::new(core),
            config,
            checkpointer: None,
        })
    }

    /// Continue conversations across runs that share a run id.
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run to completion and return the final state.
    pub async fn invoke(&self, input: &str, run_id: &str) -> Result<AgentState, AgentError> {
        let mut state = self.start(input, run_id).await.map_err(|e| {
            tracing::error!("Agent execution failed: {}", e);
            e
        })?;

        let mut phase = Phase::Reasoning;
        while phase != Phase::Done {
            let (next, _) = self.core.step(phase, &mut state).await;
            phase = next;
        }

        self.finish(&state).await?;
        Ok(state)
    }

    /// Run lazily, yielding an update as each stage completes.
    ///
    /// Dropping the stream stops the run at its next suspension point; tool
    /// tasks already on the worker pool run to completion regardless.
    pub fn stream(
        &self,
        input: &str,
        run_id: &str,
    ) -> impl Stream<Item = Result<AgentUpdate, AgentError>> + Send + 'static {
        let this = self.clone();
        let input = input.to_string();
        let run_id = run_id.to_string();

        async_stream::try_stream! {
            let mut state = this.start(&input, &run_id).await?;
            let mut phase = Phase::Reasoning;
            while phase != Phase::Done {
                let (next, update) = this.core.step(phase, &mut state).await;
                phase = next;
                if let Some(update) = update {
                    yield update;
                }
            }
            this.finish(&state).await?;
        }
    }

    /// Drain in-flight tool work and refuse new runs.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down agent...");
        self.core.executor.shutdown().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.core.executor.is_shut_down()
    }

    async fn start(&self, input: &str, run_id: &str) -> Result<AgentState, AgentError> {
        if self.is_shut_down() {
            return Err(AgentError::ShutDown);
        }

        let history = match &self.checkpointer {
            Some(checkpointer) => checkpointer
                .load(run_id)
                .await?
                .map(|snapshot| snapshot.messages)
                .unwrap_or_default(),
            None => Vec::new(),
        };

        tracing::info!(
            "Starting agent run {} ({} prior messages)",
            run_id,
            history.len()
        );
        Ok(AgentState::new(run_id, history, input))
    }

    async fn finish(&self, state: &AgentState) -> Result<(), AgentError> {
        tracing::info!(
            "Agent run {} completed: iterations={}, time={:.2}s, errors={}",
            state.run_id,
            state.iteration_count,
            state.elapsed().as_secs_f64(),
            state.errors.len()
        );
        if let Some(checkpointer) = &self.checkpointer {
            checkpointer.save(RunSnapshot::from_state(state)).await?;
        }
        Ok(())
    }
}

/// Truncate a string for display, on a char boundary.
fn truncate_for_display(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}
