//! Language model abstraction.
//!
//! The agent core only talks to [`LlmClient`]; concrete providers live in
//! submodules.

mod openai;
mod scripted;

pub use openai::OpenAiCompatibleClient;
pub use scripted::{RecordedRequest, ScriptedLlm, ScriptedReply};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier, unique within one turn
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Assistant turn returned by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiMessage {
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AiMessage {
    /// Plain text answer with no tool calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Ai(AiMessage),
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Message::Human {
            content: content.into(),
        }
    }

    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    /// Text content regardless of variant.
    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::Human { content }
            | Message::Tool { content, .. } => content,
            Message::Ai(ai) => &ai.content,
        }
    }

    pub fn as_ai(&self) -> Option<&AiMessage> {
        match self {
            Message::Ai(ai) => Some(ai),
            _ => None,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Message::System { .. })
    }
}

impl From<AiMessage> for Message {
    fn from(ai: AiMessage) -> Self {
        Message::Ai(ai)
    }
}

/// Chat model capability consumed by the agent.
///
/// `tools` carries JSON schemas of the callable tools; `None` asks for a
/// plain completion (used for forced summaries).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[Message], tools: Option<&[Value]>) -> anyhow::Result<AiMessage>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_serializes_with_role_tag() {
        let msg = Message::tool("call-1", "add_numbers", "3");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"role": "tool", "tool_call_id": "call-1", "name": "add_numbers", "content": "3"})
        );

        let ai: Message = AiMessage::text("done").into();
        assert_eq!(serde_json::to_value(&ai).unwrap(), json!({"role": "ai", "content": "done"}));
    }

    #[test]
    fn content_reads_every_variant() {
        let call = ToolCall::new("a", "search_nodes", json!({}));
        let ai = AiMessage::with_tool_calls("looking", vec![call]);
        assert!(ai.has_tool_calls());
        assert_eq!(Message::from(ai).content(), "looking");
        assert_eq!(Message::system("sys").content(), "sys");
        assert!(Message::system("sys").is_system());
        assert!(Message::human("hi").as_ai().is_none());
    }
}
