//! Persistence of auth configuration, auth state, and login attempts.
//!
//! Config and state live in the long-lived store. The PKCE verifier and
//! anti-CSRF `state` of an in-progress login live in a separate
//! attempt-scoped store and are removed when the callback is consumed.

use std::sync::Arc;

use super::types::{AuthConfig, AuthState, LoginAttempt};
use crate::store::{load_json, load_json_opt, save_json, KeyValueStore, StoreError};

const AUTH_CONFIG_KEY: &str = "yapper_auth_config";
const AUTH_STATE_KEY: &str = "yapper_auth_state";
const LOGIN_ATTEMPT_KEY: &str = "yapper_login_attempt";

/// Typed access to persisted auth data.
#[derive(Clone)]
pub struct CredentialStore {
    persistent: Arc<dyn KeyValueStore>,
    attempt: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Create a credential store over a long-lived and an attempt-scoped store.
    pub fn new(persistent: Arc<dyn KeyValueStore>, attempt: Arc<dyn KeyValueStore>) -> Self {
        Self {
            persistent,
            attempt,
        }
    }

    /// Stored auth config, if any. Malformed JSON reads as absent.
    pub fn load_config(&self) -> Option<AuthConfig> {
        load_json_opt(self.persistent.as_ref(), AUTH_CONFIG_KEY)
    }

    /// Persist the auth config.
    pub fn save_config(&self, config: &AuthConfig) -> Result<(), StoreError> {
        save_json(self.persistent.as_ref(), AUTH_CONFIG_KEY, config)
    }

    /// Stored auth state exactly as persisted (no expiry check).
    pub fn load_state(&self) -> AuthState {
        load_json(self.persistent.as_ref(), AUTH_STATE_KEY)
    }

    /// Persist the auth state.
    pub fn save_state(&self, state: &AuthState) -> Result<(), StoreError> {
        save_json(self.persistent.as_ref(), AUTH_STATE_KEY, state)
    }

    /// Remove the persisted auth state.
    pub fn clear_state(&self) -> Result<(), StoreError> {
        self.persistent.remove(AUTH_STATE_KEY)
    }

    /// Remember the secrets of a new login attempt, replacing any older one.
    pub fn save_attempt(&self, attempt: &LoginAttempt) -> Result<(), StoreError> {
        save_json(self.attempt.as_ref(), LOGIN_ATTEMPT_KEY, attempt)
    }

    /// Remove and return the current login attempt.
    ///
    /// A verifier can only be taken once, so a replayed callback finds nothing.
    pub fn take_attempt(&self) -> Result<Option<LoginAttempt>, StoreError> {
        let attempt = load_json_opt(self.attempt.as_ref(), LOGIN_ATTEMPT_KEY);
        self.attempt.remove(LOGIN_ATTEMPT_KEY)?;
        Ok(attempt)
    }

    /// Whether a login attempt is pending.
    pub fn has_attempt(&self) -> bool {
        self.attempt.get(LOGIN_ATTEMPT_KEY).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn stores() -> (Arc<MemoryStore>, Arc<MemoryStore>, CredentialStore) {
        let persistent = Arc::new(MemoryStore::new());
        let attempt = Arc::new(MemoryStore::new());
        let store = CredentialStore::new(persistent.clone(), attempt.clone());
        (persistent, attempt, store)
    }

    #[test]
    fn test_attempt_is_taken_once() {
        let (persistent, attempt, store) = stores();
        store
            .save_attempt(&LoginAttempt {
                code_verifier: "verifier".to_string(),
                state: "state".to_string(),
            })
            .unwrap();

        // Attempt secrets never land in the long-lived store
        assert!(persistent.is_empty());
        assert_eq!(attempt.len(), 1);
        assert!(store.has_attempt());

        let taken = store.take_attempt().unwrap().unwrap();
        assert_eq!(taken.code_verifier, "verifier");
        assert!(store.take_attempt().unwrap().is_none());
        assert!(!store.has_attempt());
    }

    #[test]
    fn test_state_roundtrip_and_clear() {
        let (_, _, store) = stores();
        assert_eq!(store.load_state(), AuthState::default());

        let state = AuthState {
            is_authenticated: true,
            user: None,
            access_token: Some("token".to_string()),
            refresh_token: None,
        };
        store.save_state(&state).unwrap();
        assert_eq!(store.load_state(), state);

        store.clear_state().unwrap();
        assert_eq!(store.load_state(), AuthState::default());
    }

    #[test]
    fn test_corrupt_config_reads_as_absent() {
        let (persistent, _, store) = stores();
        persistent
            .set(AUTH_CONFIG_KEY, "{oops".to_string())
            .unwrap();
        assert!(store.load_config().is_none());
    }
}
