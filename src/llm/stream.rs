//! Incremental stream parsing shared by all providers.
//!
//! Bytes are buffered raw and only complete lines are decoded, so a
//! multi-byte character split across two reads is never cut in half.

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use super::provider::{DispatchError, WireFormat};
use crate::http::ByteStream;

/// SSE end-of-stream sentinel.
const DONE_SENTINEL: &str = "[DONE]";

/// Turns a provider's streamed body into text deltas.
pub struct StreamNormalizer {
    wire: &'static dyn WireFormat,
    buffer: Vec<u8>,
    total: String,
}

impl StreamNormalizer {
    pub fn new(wire: &'static dyn WireFormat) -> Self {
        Self {
            wire,
            buffer: Vec::new(),
            total: String::new(),
        }
    }

    /// Feed one read from the transport, returning the deltas it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut deltas = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(delta) = self.process_line(&line) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Text accumulated so far.
    pub fn total(&self) -> &str {
        &self.total
    }

    /// Parse any unterminated trailing line and return the final text,
    /// along with the delta the trailing line produced, if any.
    pub fn finish(mut self) -> (String, Option<String>) {
        let rest = std::mem::take(&mut self.buffer);
        let delta = self.process_line(&rest);
        (self.total, delta)
    }

    fn process_line(&mut self, raw: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return None;
        }

        let payload = match self.wire.frame_prefix() {
            Some(prefix) => line.strip_prefix(prefix.trim_end())?.trim_start(),
            None => line,
        };
        if payload == DONE_SENTINEL {
            return None;
        }

        let Some(delta) = self.wire.parse_frame(payload) else {
            debug!(provider = self.wire.kind().id(), "Skipping stream line without text");
            return None;
        };
        if delta.is_empty() {
            return None;
        }
        self.total.push_str(&delta);
        Some(delta)
    }
}

/// Drain `body` through a [`StreamNormalizer`], sending each delta on
/// `deltas`, and return the concatenated text.
///
/// A closed receiver stops delivery but not accumulation. The body is
/// dropped on every exit path.
pub async fn normalize_stream(
    body: Option<ByteStream>,
    wire: &'static dyn WireFormat,
    deltas: Option<&mpsc::Sender<String>>,
) -> Result<String, DispatchError> {
    let mut body = body.ok_or(DispatchError::NoResponseBody)?;
    let mut normalizer = StreamNormalizer::new(wire);

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| DispatchError::MessageSend(e.to_string()))?;
        for delta in normalizer.push(&chunk) {
            deliver(deltas, delta).await;
        }
    }

    let (total, last) = normalizer.finish();
    if let Some(delta) = last {
        deliver(deltas, delta).await;
    }
    Ok(total)
}

async fn deliver(deltas: Option<&mpsc::Sender<String>>, delta: String) {
    if let Some(tx) = deltas {
        if tx.send(delta).await.is_err() {
            debug!("Delta receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderKind;

    #[test]
    fn test_partial_line_is_held_until_newline() {
        let mut normalizer = StreamNormalizer::new(ProviderKind::OpenAi.wire());
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n";
        let (head, tail) = line.split_at(20);

        assert!(normalizer.push(head.as_bytes()).is_empty());
        assert_eq!(normalizer.push(tail.as_bytes()), vec!["Hi".to_string()]);
        assert_eq!(normalizer.total(), "Hi");
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let mut normalizer = StreamNormalizer::new(ProviderKind::Anthropic.wire());
        let input = "event: content_block_delta\r\n\
                     data: {\"delta\":{\"text\":\"a\"}}\r\n\
                     \r\n\
                     data: {\"delta\":{\"text\":\"b\"}}\r\n";

        assert_eq!(normalizer.push(input.as_bytes()), vec!["a", "b"]);
    }

    #[test]
    fn test_unprefixed_lines_are_ignored_for_sse() {
        let mut normalizer = StreamNormalizer::new(ProviderKind::OpenAi.wire());
        let deltas = normalizer.push(b"{\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n");
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_finish_parses_trailing_line() {
        let mut normalizer = StreamNormalizer::new(ProviderKind::Ollama.wire());
        assert_eq!(
            normalizer.push(b"{\"message\":{\"content\":\"one \"}}\n{\"message\":{\"content\":\"two\"}}"),
            vec!["one "]
        );
        let (total, last) = normalizer.finish();
        assert_eq!(total, "one two");
        assert_eq!(last.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_missing_body_fails_before_any_delta() {
        let (tx, mut rx) = mpsc::channel(8);
        let err = normalize_stream(None, ProviderKind::OpenAi.wire(), Some(&tx))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::NoResponseBody));
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
