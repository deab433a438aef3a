//! Reasoning pass: one model call, or a forced summary once a budget is spent.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::AgentConfig;
use crate::llm::{AiMessage, LlmClient, Message};

use super::prompt::{
    iteration_limit_message, model_error_message, time_limit_message, SUMMARY_FALLBACK,
    SUMMARY_PROMPT,
};
use super::state::{AgentState, ErrorRecord};

/// How a reasoning pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningOutcome {
    /// The model answered (with or without tool calls)
    Responded,
    /// Iteration budget spent, summary produced
    IterationLimit,
    /// Time budget spent, summary produced
    TimeLimit,
    /// The model call failed and a diagnostic message was produced
    ModelError,
}

/// What one reasoning pass appended to the state.
#[derive(Debug, Clone)]
pub struct ReasoningOutput {
    pub message: AiMessage,
    pub outcome: ReasoningOutcome,
    pub error: Option<ErrorRecord>,
}

pub struct ReasoningStage {
    llm: Arc<dyn LlmClient>,
    tool_schemas: Vec<Value>,
    config: Arc<AgentConfig>,
}

impl ReasoningStage {
    pub fn new(llm: Arc<dyn LlmClient>, tool_schemas: Vec<Value>, config: Arc<AgentConfig>) -> Self {
        Self {
            llm,
            tool_schemas,
            config,
        }
    }

    /// Run one pass. Appends exactly one AI message and increments the
    /// iteration count by one, whichever branch is taken.
    pub async fn run(&self, state: &mut AgentState) -> ReasoningOutput {
        let iteration = state.iteration_count;
        let output = self.produce(state).await;

        state.messages.push(Message::Ai(output.message.clone()));
        state.iteration_count = iteration + 1;
        if let Some(error) = &output.error {
            state.errors.push(error.clone());
        }
        output
    }

    async fn produce(&self, state: &AgentState) -> ReasoningOutput {
        let iteration = state.iteration_count;

        if iteration >= self.config.max_iterations {
            tracing::warn!("Max iterations ({}) reached", self.config.max_iterations);
            let summary = self.generate_summary(&state.messages).await;
            return ReasoningOutput {
                message: AiMessage::text(iteration_limit_message(self.config.max_iterations, &summary)),
                outcome: ReasoningOutcome::IterationLimit,
                error: None,
            };
        }

        if state.elapsed() > self.config.execution_budget() {
            tracing::warn!(
                "Max execution time ({}s) exceeded",
                self.config.max_execution_time
            );
            let summary = self.generate_summary(&state.messages).await;
            return ReasoningOutput {
                message: AiMessage::text(time_limit_message(&summary)),
                outcome: ReasoningOutcome::TimeLimit,
                error: None,
            };
        }

        let request = self.build_request(state);

        tracing::info!("Agent reasoning (iteration {})...", iteration + 1);
        match self.llm.chat(&request, Some(&self.tool_schemas)).await {
            Ok(response) => {
                if response.has_tool_calls() {
                    tracing::info!(
                        "Agent planning to call {} tool(s)",
                        response.tool_calls.len()
                    );
                }
                ReasoningOutput {
                    message: response,
                    outcome: ReasoningOutcome::Responded,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!("Model invocation failed: {:#}", e);
                let error = format!("{:#}", e);
                ReasoningOutput {
                    message: AiMessage::text(model_error_message(&error)),
                    outcome: ReasoningOutcome::ModelError,
                    error: Some(ErrorRecord::reasoning(error, iteration)),
                }
            }
        }
    }

    /// History as sent to the model; the system message is only prepended on
    /// the first pass and never written back into the state.
    fn build_request(&self, state: &AgentState) -> Vec<Message> {
        match &self.config.system_message {
            Some(system) if state.iteration_count == 0 && !state.has_system_message() => {
                let mut request = Vec::with_capacity(state.messages.len() + 1);
                request.push(Message::system(system.clone()));
                request.extend(state.messages.iter().cloned());
                request
            }
            _ => state.messages.clone(),
        }
    }

    /// Best-effort summary of the conversation so far. Never fails.
    async fn generate_summary(&self, messages: &[Message]) -> String {
        let mut request = messages.to_vec();
        request.push(Message::human(SUMMARY_PROMPT));
        match self.llm.chat(&request, None).await {
            Ok(response) => response.content.trim().to_string(),
            Err(e) => {
                tracing::warn!("Summary generation failed: {:#}", e);
                SUMMARY_FALLBACK.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::{ErrorKind, Stage};
    use crate::llm::{ScriptedLlm, ScriptedReply, ToolCall};
    use serde_json::json;
    use std::time::Duration;

    fn tool_request() -> AiMessage {
        AiMessage::with_tool_calls(
            "Let me look that up.",
            vec![ToolCall::new("call-1", "search_nodes", json!({"node_type": "Author"}))],
        )
    }

    fn stage(llm: Arc<ScriptedLlm>, config: AgentConfig) -> ReasoningStage {
        ReasoningStage::new(llm, vec![json!({"type": "function"})], Arc::new(config))
    }

    #[tokio::test]
    async fn normal_pass_appends_response_and_counts() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedReply::Reply(tool_request())]));
        let stage = stage(llm.clone(), AgentConfig::default());
        let mut state = AgentState::new("r", Vec::new(), "who is hinton?");

        let output = stage.run(&mut state).await;

        assert_eq!(output.outcome, ReasoningOutcome::Responded);
        assert!(output.message.has_tool_calls());
        assert_eq!(state.iteration_count, 1);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.last_ai_message(), Some(&tool_request()));
        assert!(llm.requests()[0].with_tools);
    }

    #[tokio::test]
    async fn system_message_is_prepended_on_first_pass_only() {
        let llm = Arc::new(ScriptedLlm::repeating(ScriptedReply::Reply(AiMessage::text("ok"))));
        let stage = stage(llm.clone(), AgentConfig::default().with_system_message("be brief"));
        let mut state = AgentState::new("r", Vec::new(), "q");

        stage.run(&mut state).await;
        stage.run(&mut state).await;

        let requests = llm.requests();
        assert_eq!(requests[0].messages[0], Message::system("be brief"));
        assert_eq!(requests[0].messages.len(), 2);
        assert!(!requests[1].messages.iter().any(Message::is_system));
        assert!(!state.has_system_message());
    }

    #[tokio::test]
    async fn existing_system_message_is_not_duplicated() {
        let llm = Arc::new(ScriptedLlm::repeating(ScriptedReply::Reply(AiMessage::text("ok"))));
        let stage = stage(llm.clone(), AgentConfig::default().with_system_message("be brief"));
        let mut state = AgentState::new("r", vec![Message::system("custom")], "q");

        stage.run(&mut state).await;

        let sent = &llm.requests()[0].messages;
        assert_eq!(sent.iter().filter(|m| m.is_system()).count(), 1);
        assert_eq!(sent[0], Message::system("custom"));
    }

    #[tokio::test]
    async fn iteration_budget_forces_summary_without_tools() {
        let llm = Arc::new(ScriptedLlm::repeating(ScriptedReply::Reply(AiMessage::with_tool_calls(
            "Main facts: none.",
            tool_request().tool_calls,
        ))));
        let stage = stage(llm.clone(), AgentConfig::default().with_max_iterations(2));
        let mut state = AgentState::new("r", Vec::new(), "q");
        state.iteration_count = 2;

        let output = stage.run(&mut state).await;

        assert_eq!(output.outcome, ReasoningOutcome::IterationLimit);
        assert!(!output.message.has_tool_calls());
        assert_eq!(
            output.message.content,
            "I've reached the maximum number of reasoning steps (2). Here's what I found:\n\nMain facts: none."
        );
        assert_eq!(state.iteration_count, 3);
        let request = &llm.requests()[0];
        assert!(!request.with_tools);
        assert_eq!(request.messages.last(), Some(&Message::human(SUMMARY_PROMPT)));
    }

    #[tokio::test(start_paused = true)]
    async fn time_budget_forces_summary() {
        let llm = Arc::new(ScriptedLlm::repeating(ScriptedReply::Reply(tool_request())));
        let stage = stage(llm.clone(), AgentConfig::default().with_max_execution_time(5.0));
        let mut state = AgentState::new("r", Vec::new(), "q");

        tokio::time::advance(Duration::from_secs(6)).await;
        let output = stage.run(&mut state).await;

        assert_eq!(output.outcome, ReasoningOutcome::TimeLimit);
        assert!(!output.message.has_tool_calls());
        assert!(output.message.content.starts_with("I've reached the time limit for this query."));
        assert_eq!(state.iteration_count, 1);
    }

    #[tokio::test]
    async fn failed_summary_uses_fallback_text() {
        let llm = Arc::new(ScriptedLlm::repeating(ScriptedReply::Fail("overloaded".into())));
        let stage = stage(llm, AgentConfig::default().with_max_iterations(1));
        let mut state = AgentState::new("r", Vec::new(), "q");
        state.iteration_count = 1;

        let output = stage.run(&mut state).await;

        assert!(output.message.content.ends_with(SUMMARY_FALLBACK));
        assert!(output.error.is_none());
        assert!(state.errors.is_empty());
    }

    #[tokio::test]
    async fn model_error_is_recovered_with_record() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedReply::Fail("connection reset".into())]));
        let stage = stage(llm, AgentConfig::default());
        let mut state = AgentState::new("r", Vec::new(), "q");

        let output = stage.run(&mut state).await;

        assert_eq!(output.outcome, ReasoningOutcome::ModelError);
        assert!(output
            .message
            .content
            .starts_with("I encountered an error while processing your request: connection reset."));
        assert_eq!(state.iteration_count, 1);
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].stage, Stage::Reasoning);
        assert_eq!(state.errors[0].kind, ErrorKind::ModelError);
        assert_eq!(state.errors[0].iteration, Some(0));
    }
}
