//! Shared test helpers: a scripted HTTP transport and token builders.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use yapper::http::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use yapper::store::{KeyValueStore, MemoryStore};

/// One canned response.
#[derive(Debug, Clone)]
pub struct Scripted {
    pub status: u16,
    pub status_text: String,
    /// Body chunks as the transport would deliver them; `None` for no body.
    pub chunks: Option<Vec<Vec<u8>>>,
    /// Fail the body read after the chunks are delivered.
    pub fail_after_chunks: bool,
}

impl Scripted {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            status_text: status_text(status).to_string(),
            chunks: Some(vec![body.to_string().into_bytes()]),
            fail_after_chunks: false,
        }
    }

    pub fn chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            chunks: Some(chunks.into_iter().map(|c| c.as_ref().to_vec()).collect()),
            fail_after_chunks: false,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            status_text: status_text(status).to_string(),
            chunks: Some(Vec::new()),
            fail_after_chunks: false,
        }
    }

    pub fn no_body() -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            chunks: None,
            fail_after_chunks: false,
        }
    }

    pub fn then_fail(mut self) -> Self {
        self.fail_after_chunks = true;
        self
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "",
    }
}

/// Transport that answers from per-URL queues and records every request.
///
/// A request to a URL with no queued response fails with a transport error.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, url: impl Into<String>, response: Scripted) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.into())
            .or_default()
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url == url)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);

        let scripted = self
            .routes
            .lock()
            .unwrap()
            .get_mut(&url)
            .and_then(|queue| queue.pop_front())
            .ok_or_else(|| TransportError(format!("Connection refused: {}", url)))?;

        let body = scripted.chunks.map(|chunks| {
            let mut items: Vec<Result<Vec<u8>, TransportError>> =
                chunks.into_iter().map(Ok).collect();
            if scripted.fail_after_chunks {
                items.push(Err(TransportError("connection reset".to_string())));
            }
            futures::stream::iter(items).boxed()
        });

        Ok(HttpResponse {
            status: scripted.status,
            status_text: scripted.status_text,
            body,
        })
    }
}

pub fn memory_store() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}

/// Unsigned JWT with the given `exp` claim.
pub fn make_jwt(exp: Option<i64>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = match exp {
        Some(exp) => serde_json::json!({ "sub": "user-1", "exp": exp }),
        None => serde_json::json!({ "sub": "user-1" }),
    };
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}

pub fn future_jwt() -> String {
    make_jwt(Some(chrono::Utc::now().timestamp() + 3600))
}

pub fn past_jwt() -> String {
    make_jwt(Some(chrono::Utc::now().timestamp() - 3600))
}
