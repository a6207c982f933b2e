//! Anthropic (Claude) Messages API wire format.
//!
//! The API only accepts `user` and `assistant` roles, so every
//! non-assistant message is sent as `user`. Streamed text arrives in
//! `content_block_delta` events as `data: {"delta":{"text":"..."}}`.

use serde::{Deserialize, Serialize};

use super::{ChatMessage, ProviderKind, WireFormat};
use crate::http::HttpRequest;
use crate::settings::ModelProvider;

/// Messages endpoint.
pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic requires `max_tokens` on every request.
const MAX_TOKENS: u32 = 4096;

/// Request body for the Messages API.
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Non-streaming response.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Any SSE event payload; only `content_block_delta` carries `delta.text`.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    delta: Option<TextDelta>,
}

#[derive(Debug, Deserialize)]
struct TextDelta {
    #[serde(default)]
    text: Option<String>,
}

fn normalize_role(role: &str) -> &'static str {
    if role == "assistant" {
        "assistant"
    } else {
        "user"
    }
}

/// Anthropic wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicFormat;

impl WireFormat for AnthropicFormat {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn build_request(
        &self,
        provider: &ModelProvider,
        model: &str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<HttpRequest, serde_json::Error> {
        let body = serde_json::to_value(AnthropicRequest {
            model,
            max_tokens: MAX_TOKENS,
            messages: messages
                .iter()
                .map(|m| AnthropicMessage {
                    role: normalize_role(&m.role),
                    content: &m.content,
                })
                .collect(),
            stream,
        })?;
        let api_key = provider.api_key.as_deref().unwrap_or_default();

        Ok(HttpRequest::post_json(ANTHROPIC_MESSAGES_URL, body)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION))
    }

    fn parse_response(&self, body: &[u8]) -> Result<String, serde_json::Error> {
        let response: MessagesResponse = serde_json::from_slice(body)?;
        Ok(response
            .content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .unwrap_or_default())
    }

    fn frame_prefix(&self) -> Option<&'static str> {
        Some("data: ")
    }

    fn parse_frame(&self, payload: &str) -> Option<String> {
        let event: StreamEvent = serde_json::from_str(payload).ok()?;
        event.delta?.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RequestBody;
    use crate::settings::default_providers;
    use serde_json::json;

    fn anthropic() -> ModelProvider {
        let mut provider = default_providers().remove(1);
        provider.api_key = Some("sk-ant-test".to_string());
        provider
    }

    #[test]
    fn test_build_request_normalizes_roles() {
        let messages = vec![
            ChatMessage::new("system", "You are a helpful assistant."),
            ChatMessage::new("user", "Hello"),
            ChatMessage::new("assistant", "Hi there!"),
            ChatMessage::new("user", "How are you?"),
        ];
        let request = AnthropicFormat
            .build_request(&anthropic(), "claude-3-haiku", &messages, false)
            .unwrap();

        assert_eq!(request.url, ANTHROPIC_MESSAGES_URL);
        assert_eq!(request.header_value("x-api-key"), Some("sk-ant-test"));
        assert_eq!(request.header_value("anthropic-version"), Some("2023-06-01"));
        assert_eq!(request.header_value("Authorization"), None);
        assert_eq!(
            request.body,
            RequestBody::Json(json!({
                "model": "claude-3-haiku",
                "max_tokens": 4096,
                "messages": [
                    { "role": "user", "content": "You are a helpful assistant." },
                    { "role": "user", "content": "Hello" },
                    { "role": "assistant", "content": "Hi there!" },
                    { "role": "user", "content": "How are you?" }
                ],
                "stream": false
            }))
        );
    }

    #[test]
    fn test_parse_response() {
        let body = br#"{"id":"msg_1","content":[{"type":"text","text":"Hello!"}]}"#;
        assert_eq!(AnthropicFormat.parse_response(body).unwrap(), "Hello!");
        assert_eq!(AnthropicFormat.parse_response(br#"{"content":[]}"#).unwrap(), "");
    }

    #[test]
    fn test_parse_frame() {
        let frame = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        assert_eq!(AnthropicFormat.parse_frame(frame), Some("Hello".to_string()));

        let stop = r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#;
        assert_eq!(AnthropicFormat.parse_frame(stop), None);

        let start = r#"{"type":"message_start","message":{"id":"msg_1"}}"#;
        assert_eq!(AnthropicFormat.parse_frame(start), None);
    }
}
