//! Chat sessions and the message send lifecycle.
//!
//! [`SessionManager`] owns every session and the active-session pointer.
//! A send is split into three steps so streamed updates can be applied
//! while the request is still running:
//!
//! 1. [`SessionManager::begin_send`] appends the user message and an empty
//!    assistant placeholder and hands out a [`PendingSend`] ticket.
//! 2. [`SessionManager::apply_delta`] writes the text received so far.
//! 3. [`SessionManager::complete_send`] writes the final text, or drops the
//!    placeholder on failure. Text streamed before the failure stays visible
//!    until then but is not kept.
//!
//! [`SessionManager::send_message`] drives all three against a [`Dispatcher`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm::{DispatchError, Dispatcher};
use crate::message::Message;
use crate::settings::{AppSettings, ModelProvider};
use crate::store::{load_json, load_json_opt, save_json, KeyValueStore, StoreError};

const SESSIONS_KEY: &str = "yapper_sessions";
const ACTIVE_SESSION_KEY: &str = "yapper_active_session";

/// Title of a session that has not received a message yet.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Characters of the first message kept in a derived title.
const TITLE_LENGTH: usize = 50;

/// Buffered deltas between the dispatcher and the session writer.
const DELTA_BUFFER: usize = 64;

/// Errors surfaced when sending a message.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("No active session")]
    NoActiveSession,

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("API key required for {0}")]
    ApiKeyRequired(String),

    #[error("A message is already being sent in session {0}")]
    SendInProgress(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// A conversation with one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub updated_at: i64,
    pub model: String,
    pub provider: String,
}

impl ChatSession {
    fn new(model: &str, provider: &str) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            model: model.to_string(),
            provider: provider.to_string(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().timestamp_millis();
    }

    fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

/// Title derived from the first user message.
pub fn derive_title(content: &str) -> String {
    let head: String = content.chars().take(TITLE_LENGTH).collect();
    format!("{}...", head)
}

/// Ticket for one in-flight send.
#[derive(Debug)]
pub struct PendingSend {
    session_id: String,
    assistant_id: String,
    content: String,
    history: Vec<Message>,
    provider: ModelProvider,
    model: String,
}

impl PendingSend {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }
}

/// Result of [`SessionManager::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// There was no active session; one was created and nothing was sent.
    /// Send again to deliver the message.
    SessionCreated { session_id: String },
    /// The assistant replied.
    Completed { session_id: String, response: String },
}

/// Owns the session collection and the active-session pointer.
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    sessions: Vec<ChatSession>,
    active_id: Option<String>,
    /// Session id to assistant placeholder id of the send in progress.
    in_flight: HashMap<String, String>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.len())
            .field("active_id", &self.active_id)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Load sessions from the store.
    ///
    /// The persisted active id is used when it names a known session,
    /// otherwise the most recent session, otherwise none.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let sessions: Vec<ChatSession> = load_json(store.as_ref(), SESSIONS_KEY);
        let saved: Option<String> = load_json_opt(store.as_ref(), ACTIVE_SESSION_KEY);
        let active_id = saved
            .filter(|id| sessions.iter().any(|s| &s.id == id))
            .or_else(|| sessions.first().map(|s| s.id.clone()));

        debug!(sessions = sessions.len(), "Loaded chat sessions");
        Self {
            store,
            sessions,
            active_id,
            in_flight: HashMap::new(),
        }
    }

    /// All sessions, most recent first.
    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn session(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    fn session_mut(&mut self, id: &str) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    /// The active session, if the pointer still names one.
    pub fn active_session(&self) -> Option<&ChatSession> {
        self.active_id.as_deref().and_then(|id| self.session(id))
    }

    /// Whether a send is running in this session.
    pub fn is_sending(&self, session_id: &str) -> bool {
        self.in_flight.contains_key(session_id)
    }

    /// Create a session for the selected model, make it active, and persist.
    pub fn create_session(&mut self, settings: &AppSettings) -> Result<&ChatSession, StoreError> {
        let session = ChatSession::new(&settings.selected_model, &settings.selected_provider);
        let id = session.id.clone();
        info!(session = %id, "Created chat session");

        self.sessions.insert(0, session);
        self.active_id = Some(id);
        self.persist_sessions()?;
        self.persist_active()?;
        Ok(&self.sessions[0])
    }

    /// Delete a session. Returns `false` if the id is unknown.
    ///
    /// Deleting the active session activates the most recent remaining one.
    pub fn delete_session(&mut self, id: &str) -> Result<bool, StoreError> {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return Ok(false);
        }
        self.in_flight.remove(id);
        self.persist_sessions()?;

        if self.active_id.as_deref() == Some(id) {
            self.active_id = self.sessions.first().map(|s| s.id.clone());
            self.persist_active()?;
        }
        info!(session = %id, "Deleted chat session");
        Ok(true)
    }

    /// Make a session active. Returns `false` if the id is unknown.
    ///
    /// Only the pointer is persisted.
    pub fn switch_session(&mut self, id: &str) -> Result<bool, StoreError> {
        if self.session(id).is_none() {
            return Ok(false);
        }
        self.active_id = Some(id.to_string());
        self.persist_active()?;
        Ok(true)
    }

    /// Point the active session at another provider and model.
    pub fn retarget_active(&mut self, provider: &str, model: &str) -> Result<bool, StoreError> {
        let Some(id) = self.active_id.clone() else {
            return Ok(false);
        };
        let Some(session) = self.session_mut(&id) else {
            return Ok(false);
        };
        session.provider = provider.to_string();
        session.model = model.to_string();
        session.touch();
        self.persist_sessions()?;
        Ok(true)
    }

    /// Start a send in the active session.
    ///
    /// Appends the user message and an empty assistant placeholder, derives
    /// the title from the first message, and persists.
    pub fn begin_send(
        &mut self,
        content: &str,
        settings: &AppSettings,
    ) -> Result<PendingSend, ChatError> {
        let session_id = self
            .active_session()
            .map(|s| s.id.clone())
            .ok_or(ChatError::NoActiveSession)?;
        if self.is_sending(&session_id) {
            return Err(ChatError::SendInProgress(session_id));
        }

        let Some(session) = self.session_mut(&session_id) else {
            return Err(ChatError::NoActiveSession);
        };
        let provider = settings
            .provider(&session.provider)
            .cloned()
            .ok_or_else(|| ChatError::ProviderNotFound(session.provider.clone()))?;
        if !provider.is_configured() {
            return Err(ChatError::ApiKeyRequired(provider.name.clone()));
        }

        let history = session.messages.clone();
        let model = session.model.clone();
        let user = Message::user(content.to_string());
        let assistant = Message::assistant(String::new()).with_origin(&model, &provider.id);
        let assistant_id = assistant.id.clone();

        if session.title == DEFAULT_TITLE {
            session.title = derive_title(content);
        }
        session.messages.push(user);
        session.messages.push(assistant);
        session.touch();

        self.in_flight
            .insert(session_id.clone(), assistant_id.clone());
        if let Err(e) = self.persist_sessions() {
            self.in_flight.remove(&session_id);
            return Err(e.into());
        }

        Ok(PendingSend {
            session_id,
            assistant_id,
            content: content.to_string(),
            history,
            provider,
            model,
        })
    }

    fn is_current(&self, pending: &PendingSend) -> bool {
        self.in_flight.get(&pending.session_id) == Some(&pending.assistant_id)
    }

    /// Replace the placeholder content with the text received so far.
    ///
    /// Ignored if the send is no longer current (session deleted, or a
    /// newer send took over).
    pub fn apply_delta(&mut self, pending: &PendingSend, text_so_far: &str) {
        if !self.is_current(pending) {
            return;
        }
        let Some(session) = self.session_mut(&pending.session_id) else {
            return;
        };
        let Some(message) = session.message_mut(&pending.assistant_id) else {
            return;
        };
        message.content = text_so_far.to_string();
        session.touch();

        if let Err(e) = self.persist_sessions() {
            warn!(error = %e, "Failed to persist streamed update");
        }
    }

    /// Finish a send with the dispatcher's result.
    ///
    /// On failure the assistant placeholder is removed, along with any text
    /// already streamed into it, and the error is returned.
    pub fn complete_send(
        &mut self,
        pending: PendingSend,
        result: Result<String, DispatchError>,
    ) -> Result<String, ChatError> {
        let current = self.is_current(&pending);
        if current {
            self.in_flight.remove(&pending.session_id);
        }

        if current {
            if let Some(session) = self.session_mut(&pending.session_id) {
                match &result {
                    Ok(text) => {
                        if let Some(message) = session.message_mut(&pending.assistant_id) {
                            message.content = text.clone();
                        }
                    }
                    Err(_) => {
                        session.messages.retain(|m| m.id != pending.assistant_id);
                    }
                }
                session.touch();
                self.persist_sessions()?;
            }
        }

        match result {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(session = %pending.session_id, error = %e, "Message send failed");
                Err(e.into())
            }
        }
    }

    /// Send a message in the active session.
    ///
    /// With no active session, one is created and nothing is sent. Streaming
    /// follows `settings.streaming_enabled`; each delta is applied to the
    /// session and forwarded on `forward`.
    pub async fn send_message(
        &mut self,
        content: &str,
        settings: &AppSettings,
        dispatcher: &Dispatcher,
        forward: Option<mpsc::Sender<String>>,
    ) -> Result<SendOutcome, ChatError> {
        if self.active_session().is_none() {
            let session_id = self.create_session(settings)?.id.clone();
            return Ok(SendOutcome::SessionCreated { session_id });
        }

        let pending = self.begin_send(content, settings)?;
        let result = if settings.streaming_enabled {
            self.stream_into(&pending, dispatcher, forward.as_ref()).await
        } else {
            dispatcher
                .send_message(
                    &pending.content,
                    &pending.history,
                    &pending.provider,
                    &pending.model,
                    None,
                )
                .await
        };

        let session_id = pending.session_id.clone();
        let response = self.complete_send(pending, result)?;
        Ok(SendOutcome::Completed {
            session_id,
            response,
        })
    }

    async fn stream_into(
        &mut self,
        pending: &PendingSend,
        dispatcher: &Dispatcher,
        forward: Option<&mpsc::Sender<String>>,
    ) -> Result<String, DispatchError> {
        let (tx, mut rx) = mpsc::channel::<String>(DELTA_BUFFER);
        let send = dispatcher.send_message(
            &pending.content,
            &pending.history,
            &pending.provider,
            &pending.model,
            Some(tx),
        );
        tokio::pin!(send);

        let mut text = String::new();
        let result = loop {
            tokio::select! {
                Some(delta) = rx.recv() => {
                    text.push_str(&delta);
                    self.apply_delta(pending, &text);
                    forward_delta(forward, delta).await;
                }
                result = &mut send => break result,
            }
        };

        while let Ok(delta) = rx.try_recv() {
            text.push_str(&delta);
            self.apply_delta(pending, &text);
            forward_delta(forward, delta).await;
        }
        result
    }

    fn persist_sessions(&self) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), SESSIONS_KEY, &self.sessions)
    }

    fn persist_active(&self) -> Result<(), StoreError> {
        match &self.active_id {
            Some(id) => save_json(self.store.as_ref(), ACTIVE_SESSION_KEY, id),
            None => self.store.remove(ACTIVE_SESSION_KEY),
        }
    }
}

async fn forward_delta(forward: Option<&mpsc::Sender<String>>, delta: String) {
    if let Some(tx) = forward {
        let _ = tx.send(delta).await;
    }
}
