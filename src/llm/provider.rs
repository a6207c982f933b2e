//! Wire format trait for the provider backends.
//!
//! Each backend (OpenAI-style chat completions, Anthropic messages, Ollama
//! chat) implements [`WireFormat`]: how to build a request, how to read a
//! non-streaming response, and how to read one streamed frame.

use thiserror::Error;

use super::{ChatMessage, ProviderKind};
use crate::http::HttpRequest;
use crate::settings::ModelProvider;

/// Request, response, and stream-frame shapes of one backend.
pub trait WireFormat: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> ProviderKind;

    /// Build the outbound request for `messages`.
    ///
    /// `stream` is set on the request body; the caller decides it.
    fn build_request(
        &self,
        provider: &ModelProvider,
        model: &str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<HttpRequest, serde_json::Error>;

    /// Extract the response text from a non-streaming JSON body.
    ///
    /// A well-formed body without the text field yields an empty string.
    fn parse_response(&self, body: &[u8]) -> Result<String, serde_json::Error>;

    /// Marker that prefixes each event line (`data: ` for SSE), or `None`
    /// when every line is a bare JSON document.
    fn frame_prefix(&self) -> Option<&'static str>;

    /// Extract the text increment from one frame payload.
    ///
    /// Returns `None` for payloads that are not JSON or carry no text.
    fn parse_frame(&self, payload: &str) -> Option<String>;
}

/// Errors from sending a message to a provider.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The provider id is not one of the supported backends.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// The provider answered with a non-success status.
    #[error("{provider} API error: {status_text} ({status})")]
    ProviderApi {
        provider: &'static str,
        status: u16,
        status_text: String,
    },

    /// A streaming response had no readable body.
    #[error("No response body")]
    NoResponseBody,

    /// Anything else that went wrong while sending.
    #[error("Failed to send message: {0}")]
    MessageSend(String),
}

impl DispatchError {
    /// HTTP status of a provider API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ProviderApi { status, .. } => Some(*status),
            _ => None,
        }
    }
}
