//! Provider dispatcher: one entry point for every backend.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::provider::DispatchError;
use super::stream::normalize_stream;
use super::{ChatMessage, ProviderKind};
use crate::http::HttpTransport;
use crate::message::{Message, Role};
use crate::settings::ModelProvider;

/// Sends chat requests to the configured provider.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Send `message` after `history` and return the full response text.
    ///
    /// Streaming is requested exactly when `deltas` is supplied; each text
    /// increment is then sent on it as it arrives.
    pub async fn send_message(
        &self,
        message: &str,
        history: &[Message],
        provider: &ModelProvider,
        model: &str,
        deltas: Option<mpsc::Sender<String>>,
    ) -> Result<String, DispatchError> {
        let kind = ProviderKind::from_id(&provider.id)
            .ok_or_else(|| DispatchError::UnsupportedProvider(provider.id.clone()))?;
        let wire = kind.wire();
        let stream = deltas.is_some();

        let messages: Vec<ChatMessage> = history
            .iter()
            .map(ChatMessage::from)
            .chain(std::iter::once(ChatMessage::new(Role::User.as_str(), message)))
            .collect();

        let request = wire
            .build_request(provider, model, &messages, stream)
            .map_err(|e| DispatchError::MessageSend(e.to_string()))?;

        debug!(
            provider = kind.id(),
            model,
            stream,
            messages = messages.len(),
            "Sending chat request"
        );

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| DispatchError::MessageSend(e.to_string()))?;

        if !response.is_success() {
            warn!(provider = kind.id(), status = response.status, "Provider returned an error");
            return Err(DispatchError::ProviderApi {
                provider: kind.display_name(),
                status: response.status,
                status_text: response.status_text,
            });
        }

        if stream {
            return normalize_stream(response.body, wire, deltas.as_ref()).await;
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DispatchError::MessageSend(e.to_string()))?;
        wire.parse_response(&body)
            .map_err(|e| DispatchError::MessageSend(e.to_string()))
    }
}
