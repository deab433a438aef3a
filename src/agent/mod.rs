//! Agent module - the reasoning/tool loop.
//!
//! The agent alternates two stages until the model answers:
//! 1. Reasoning: call the LLM with the history and the tool schemas
//! 2. Tools: run every requested tool call concurrently and append the results
//!
//! Iteration and wall-clock budgets end the loop with a forced summary.

mod agent_loop;
mod checkpoint;
mod executor;
mod prompt;
mod reasoning;
mod retry;
mod state;
mod tool_stage;

pub use agent_loop::{AgentController, AgentError, AgentUpdate};
pub use checkpoint::{CheckpointError, Checkpointer, InMemoryCheckpointer, RunSnapshot};
pub use executor::{BoundedExecutor, ExecutorError};
pub use prompt::{build_system_prompt, SUMMARY_FALLBACK, SUMMARY_PROMPT};
pub use reasoning::{ReasoningOutcome, ReasoningOutput, ReasoningStage};
pub use retry::{backoff_delay, RetryingInvoker};
pub use state::{AgentState, ErrorKind, ErrorRecord, Stage};
pub use tool_stage::{ToolExecutionStage, ToolStageOutput};
