//! OpenAI chat completions wire format.
//!
//! Streaming uses SSE: `data: {"choices":[{"delta":{"content":"..."}}]}`
//! frames terminated by `data: [DONE]`.

use serde::{Deserialize, Serialize};

use super::{ChatMessage, ProviderKind, WireFormat};
use crate::http::HttpRequest;
use crate::settings::ModelProvider;

/// Chat completions endpoint.
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Request body for chat completions.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Non-streaming response.
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Streaming response chunk (SSE format).
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiFormat;

impl WireFormat for OpenAiFormat {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn build_request(
        &self,
        provider: &ModelProvider,
        model: &str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<HttpRequest, serde_json::Error> {
        let body = serde_json::to_value(ChatRequest {
            model,
            messages,
            stream,
        })?;
        let api_key = provider.api_key.as_deref().unwrap_or_default();

        Ok(HttpRequest::post_json(OPENAI_CHAT_URL, body).bearer(api_key))
    }

    fn parse_response(&self, body: &[u8]) -> Result<String, serde_json::Error> {
        let response: CompletionResponse = serde_json::from_slice(body)?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_default())
    }

    fn frame_prefix(&self) -> Option<&'static str> {
        Some("data: ")
    }

    fn parse_frame(&self, payload: &str) -> Option<String> {
        let chunk: StreamChunk = serde_json::from_str(payload).ok()?;
        chunk.choices.into_iter().next()?.delta?.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::default_providers;
    use serde_json::json;

    fn openai() -> ModelProvider {
        let mut provider = default_providers().remove(0);
        provider.api_key = Some("sk-test".to_string());
        provider
    }

    #[test]
    fn test_build_request() {
        let messages = vec![
            ChatMessage::new("system", "Be brief."),
            ChatMessage::new("user", "Hello"),
        ];
        let request = OpenAiFormat
            .build_request(&openai(), "gpt-4", &messages, true)
            .unwrap();

        assert_eq!(request.url, OPENAI_CHAT_URL);
        assert_eq!(request.header_value("Authorization"), Some("Bearer sk-test"));
        assert_eq!(
            request.body,
            crate::http::RequestBody::Json(json!({
                "model": "gpt-4",
                "messages": [
                    { "role": "system", "content": "Be brief." },
                    { "role": "user", "content": "Hello" }
                ],
                "stream": true
            }))
        );
    }

    #[test]
    fn test_parse_response() {
        let body = br#"{"choices":[{"message":{"role":"assistant","content":"Hi there!"}}]}"#;
        assert_eq!(OpenAiFormat.parse_response(body).unwrap(), "Hi there!");

        assert_eq!(OpenAiFormat.parse_response(br#"{"choices":[]}"#).unwrap(), "");
        assert!(OpenAiFormat.parse_response(b"not json").is_err());
    }

    #[test]
    fn test_parse_frame() {
        let frame = r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        assert_eq!(OpenAiFormat.parse_frame(frame), Some("Hel".to_string()));

        // Role-only first chunk and final chunk carry no text
        assert_eq!(
            OpenAiFormat.parse_frame(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#),
            None
        );
        assert_eq!(
            OpenAiFormat.parse_frame(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            None
        );
        assert_eq!(OpenAiFormat.parse_frame("{broken"), None);
    }
}
