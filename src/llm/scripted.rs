//! Scripted model for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{AiMessage, LlmClient, Message};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Reply(AiMessage),
    Fail(String),
}

/// A request the scripted model received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub with_tools: bool,
}

/// Replays queued replies in order, then falls back to a fixed reply.
///
/// Every request is recorded so tests can assert on what the agent sent.
pub struct ScriptedLlm {
    queue: Mutex<VecDeque<ScriptedReply>>,
    fallback: ScriptedReply,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            queue: Mutex::new(replies.into()),
            fallback: ScriptedReply::Reply(AiMessage::text("")),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with the same reply.
    pub fn repeating(reply: ScriptedReply) -> Self {
        Self::new(Vec::new()).with_fallback(reply)
    }

    pub fn with_fallback(mut self, reply: ScriptedReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, messages: &[Message], tools: Option<&[Value]>) -> anyhow::Result<AiMessage> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                messages: messages.to_vec(),
                with_tools: tools.is_some(),
            });
        }

        let next = self
            .queue
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| self.fallback.clone());

        match next {
            ScriptedReply::Reply(ai) => Ok(ai),
            ScriptedReply::Fail(reason) => Err(anyhow::anyhow!(reason)),
        }
    }
}
