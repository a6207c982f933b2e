use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::auth::{AuthFlow, CredentialStore};
use crate::config::Config;
use crate::http::{HttpTransport, ReqwestTransport};
use crate::llm::Dispatcher;
use crate::session::{ChatError, SendOutcome, SessionManager};
use crate::settings::AppSettings;
use crate::store::{JsonFileStore, KeyValueStore};

/// Mask an API key for display, showing only first and last 4 characters.
///
/// Examples:
/// - "sk-ant-api03-abc123xyz789" -> "sk-a...z789"
/// - "short" -> "*****"
/// - "" -> ""
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Application state: the auth flow, sessions, settings, and dispatcher,
/// all sharing one long-lived store.
pub struct App {
    pub config: Config,
    pub auth: AuthFlow,
    pub sessions: SessionManager,
    store: Arc<dyn KeyValueStore>,
    /// Settings as persisted.
    stored_settings: AppSettings,
    /// Persisted settings plus per-run environment overrides.
    settings: AppSettings,
    env: fn(&str) -> Option<String>,
    dispatcher: Dispatcher,
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl App {
    /// Build the app from config: file-backed stores under the data
    /// directory and a reqwest transport.
    pub fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> =
            Arc::new(JsonFileStore::open(config.storage.state_path()));
        let attempt: Arc<dyn KeyValueStore> =
            Arc::new(JsonFileStore::open(config.storage.login_attempt_path()));
        let transport = ReqwestTransport::new(config.http.connect_timeout(), &config.http.user_agent)
            .context("Failed to build HTTP client")?;

        Ok(Self::from_parts(
            config,
            store,
            attempt,
            Arc::new(transport),
            process_env,
        ))
    }

    /// Build the app from explicit parts.
    ///
    /// `env` supplies per-run overrides (API keys, Ollama URL, issuer and
    /// client id); they are applied in memory and never persisted.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        attempt: Arc<dyn KeyValueStore>,
        transport: Arc<dyn HttpTransport>,
        env: fn(&str) -> Option<String>,
    ) -> Self {
        let credentials = CredentialStore::new(store.clone(), attempt);
        let mut auth = AuthFlow::new(credentials, transport.clone(), config.auth.to_auth_config());

        let mut auth_config = auth.config().clone();
        auth_config.apply_overrides(env);
        if &auth_config != auth.config() {
            debug!("Using auth config overrides from the environment");
            auth.override_config(auth_config);
        }

        let stored_settings = AppSettings::load(&store);
        let mut settings = stored_settings.clone();
        settings.apply_overrides(env);

        Self {
            config,
            auth,
            sessions: SessionManager::new(store.clone()),
            store,
            stored_settings,
            settings,
            env,
            dispatcher: Dispatcher::new(transport),
        }
    }

    /// Effective settings for this run.
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Change the persisted settings.
    ///
    /// `change` returns `false` to reject the edit (e.g. unknown provider);
    /// nothing is saved then.
    pub fn update_settings(&mut self, change: impl FnOnce(&mut AppSettings) -> bool) -> Result<bool> {
        if !change(&mut self.stored_settings) {
            return Ok(false);
        }
        self.stored_settings
            .save(&self.store)
            .context("Failed to save settings")?;

        let mut settings = self.stored_settings.clone();
        settings.apply_overrides(self.env);
        self.settings = settings;
        Ok(true)
    }

    /// Create a session for the selected model.
    pub fn new_session(&mut self) -> Result<String> {
        let session = self
            .sessions
            .create_session(&self.settings)
            .context("Failed to save session")?;
        Ok(session.id.clone())
    }

    /// Send a message in the active session.
    pub async fn send(
        &mut self,
        content: &str,
        forward: Option<mpsc::Sender<String>>,
    ) -> Result<SendOutcome, ChatError> {
        self.sessions
            .send_message(content, &self.settings, &self.dispatcher, forward)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("sk-ant-api03-abc123xyz789"), "sk-a...z789");
        assert_eq!(mask_api_key("short"), "*****");
        assert_eq!(mask_api_key(""), "");
    }
}
