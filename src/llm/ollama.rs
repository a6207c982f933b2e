//! Ollama chat wire format for local models.
//!
//! Ollama needs no authentication. Streaming responses are newline-delimited
//! JSON objects (no SSE prefix), each `{"message":{"content":"..."},"done":false}`.

use serde::{Deserialize, Serialize};

use super::{ChatMessage, ProviderKind, WireFormat};
use crate::http::HttpRequest;
use crate::settings::ModelProvider;

/// Default Ollama API base URL.
pub const DEFAULT_API_BASE: &str = "http://localhost:11434";

/// Ollama chat request format.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Response body, and also each streamed line.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn chat_url(provider: &ModelProvider) -> String {
    let base = provider
        .base_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .unwrap_or(DEFAULT_API_BASE);
    format!("{}/api/chat", base.trim_end_matches('/'))
}

/// Ollama wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaFormat;

impl WireFormat for OllamaFormat {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn build_request(
        &self,
        provider: &ModelProvider,
        model: &str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<HttpRequest, serde_json::Error> {
        let body = serde_json::to_value(OllamaChatRequest {
            model,
            messages,
            stream,
        })?;
        Ok(HttpRequest::post_json(chat_url(provider), body))
    }

    fn parse_response(&self, body: &[u8]) -> Result<String, serde_json::Error> {
        let response: OllamaChatResponse = serde_json::from_slice(body)?;
        Ok(response
            .message
            .and_then(|message| message.content)
            .unwrap_or_default())
    }

    fn frame_prefix(&self) -> Option<&'static str> {
        None
    }

    fn parse_frame(&self, payload: &str) -> Option<String> {
        let chunk: OllamaChatResponse = serde_json::from_str(payload).ok()?;
        chunk.message?.content
    }
}
