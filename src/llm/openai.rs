//! Client for OpenAI-compatible chat completion endpoints (OpenRouter, OpenAI, vLLM, ...).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{AiMessage, LlmClient, Message, ToolCall};

/// Chat completion client speaking the OpenAI wire format.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, messages: &[Message], tools: Option<&[Value]>) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(to_wire_message).collect::<Vec<_>>(),
        });
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = Value::Array(tools.to_vec());
        }
        body
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat(&self, messages: &[Message], tools: Option<&[Value]>) -> anyhow::Result<AiMessage> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request(messages, tools);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Request to {} failed: {}", url, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Model API returned {}: {}", status, text));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Invalid completion response: {}", e))?;

        parse_completion(parsed)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireAssistantMessage,
}

#[derive(Debug, Deserialize)]
struct WireAssistantMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn parse_completion(response: CompletionResponse) -> anyhow::Result<AiMessage> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Completion response contained no choices"))?;

    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|tc| {
            let arguments = if tc.function.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&tc.function.arguments).map_err(|e| {
                    anyhow::anyhow!(
                        "Malformed arguments for tool call {}: {}",
                        tc.function.name,
                        e
                    )
                })?
            };
            Ok(ToolCall {
                id: tc.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
                name: tc.function.name,
                arguments,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(AiMessage {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
    })
}

fn to_wire_message(message: &Message) -> Value {
    match message {
        Message::System { content } => json!({"role": "system", "content": content}),
        Message::Human { content } => json!({"role": "user", "content": content}),
        Message::Ai(ai) if ai.has_tool_calls() => json!({
            "role": "assistant",
            "content": ai.content,
            "tool_calls": ai.tool_calls.iter().map(|tc| json!({
                "id": tc.id,
                "type": "function",
                "function": {
                    "name": tc.name,
                    "arguments": tc.arguments.to_string(),
                }
            })).collect::<Vec<_>>(),
        }),
        Message::Ai(ai) => json!({"role": "assistant", "content": ai.content}),
        Message::Tool {
            tool_call_id,
            content,
            ..
        } => json!({"role": "tool", "tool_call_id": tool_call_id, "content": content}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_calls_are_encoded_with_string_arguments() {
        let ai = AiMessage::with_tool_calls(
            "",
            vec![ToolCall::new("call-1", "add_numbers", json!({"a": 1, "b": 2}))],
        );
        let wire = to_wire_message(&Message::Ai(ai));
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "add_numbers");
        let args: Value =
            serde_json::from_str(wire["tool_calls"][0]["function"]["arguments"].as_str().unwrap())
                .unwrap();
        assert_eq!(args, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn request_omits_empty_tool_list() {
        let client = OpenAiCompatibleClient::new("http://localhost/v1/", "key", "m");
        let body = client.build_request(&[Message::human("hi")], Some(&[]));
        assert!(body.get("tools").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(client.base_url, "http://localhost/v1");
    }

    #[test]
    fn completion_parsing_fills_missing_ids_and_null_content() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "function": {"name": "search_nodes", "arguments": "{\"node_type\":\"Author\"}"}
                    }]
                }
            }]
        });
        let parsed: CompletionResponse = serde_json::from_value(raw).unwrap();
        let ai = parse_completion(parsed).unwrap();
        assert_eq!(ai.content, "");
        assert_eq!(ai.tool_calls.len(), 1);
        assert!(ai.tool_calls[0].id.starts_with("call_"));
        assert_eq!(ai.tool_calls[0].arguments["node_type"], "Author");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let parsed: CompletionResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(parse_completion(parsed).is_err());
    }
}
