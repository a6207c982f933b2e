//! LLM client module for provider API interactions.
//!
//! This module provides a unified interface over three backends:
//! - OpenAI (chat completions, SSE streaming)
//! - Anthropic (messages API, SSE streaming)
//! - Ollama (local models, newline-delimited JSON streaming)
//!
//! [`Dispatcher`] is the single entry point. Streamed text is delivered as
//! deltas over a `tokio::sync::mpsc` channel.

mod anthropic;
mod dispatch;
mod ollama;
mod openai;
mod provider;
mod stream;

pub use anthropic::{AnthropicFormat, ANTHROPIC_MESSAGES_URL};
pub use dispatch::Dispatcher;
pub use ollama::{OllamaFormat, DEFAULT_API_BASE as OLLAMA_DEFAULT_BASE};
pub use openai::{OpenAiFormat, OPENAI_CHAT_URL};
pub use provider::{DispatchError, WireFormat};
pub use stream::{normalize_stream, StreamNormalizer};

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    /// Returns all providers in display order.
    pub const fn all() -> &'static [ProviderKind] {
        &[
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::Ollama,
        ]
    }

    /// Resolve a provider id (`"openai"`, `"anthropic"`, `"ollama"`).
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "openai" => Some(ProviderKind::OpenAi),
            "anthropic" => Some(ProviderKind::Anthropic),
            "ollama" => Some(ProviderKind::Ollama),
            _ => None,
        }
    }

    /// Provider id as stored in settings.
    pub const fn id(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
        }
    }

    /// Get the display name for this provider.
    pub const fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Anthropic => "Anthropic",
            ProviderKind::Ollama => "Ollama",
        }
    }

    /// The wire format for this provider.
    pub fn wire(&self) -> &'static dyn WireFormat {
        match self {
            ProviderKind::OpenAi => &OpenAiFormat,
            ProviderKind::Anthropic => &AnthropicFormat,
            ProviderKind::Ollama => &OllamaFormat,
        }
    }
}

/// Chat message for API requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self::new(message.role.as_str(), message.content.clone())
    }
}
