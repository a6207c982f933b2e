//! OAuth 2.0 Authorization Code flow with PKCE against an OIDC provider.
//!
//! The controller owns the auth config and auth state. Login produces the
//! authorization URL for the browser; the flow resumes when the redirect
//! URL comes back through [`AuthFlow::handle_callback`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::jwt::is_token_expired;
use super::pkce::{generate_code_verifier, Pkce, PkceError};
use super::storage::CredentialStore;
use super::types::{AuthConfig, AuthState, LoginAttempt, TokenResponse, User, UserInfo};
use crate::http::{HttpRequest, HttpTransport};
use crate::store::StoreError;

/// Errors from the auth flow. Every variant leaves the user signed out.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity provider returned an error code.
    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("No authorization code received")]
    MissingCode,

    /// No verifier for this attempt (attempt scope lost or callback replayed).
    #[error("No code verifier found")]
    MissingVerifier,

    /// The returned `state` does not match the one sent with the attempt.
    #[error("State mismatch - possible CSRF attack")]
    StateMismatch,

    #[error("Failed to exchange code for tokens: {0}")]
    TokenExchange(String),

    #[error("Failed to get user info: {0}")]
    UserInfoFetch(String),

    #[error("Failed to refresh token: {0}")]
    Refresh(String),

    #[error(transparent)]
    Pkce(#[from] PkceError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Query parameters of an authorization response.
#[derive(Debug, Default)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    state: Option<String>,
}

impl CallbackParams {
    fn parse(callback_url: &str) -> Self {
        let url = match reqwest::Url::parse(callback_url) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Callback URL could not be parsed");
                return Self::default();
            }
        };

        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

/// Auth flow controller.
pub struct AuthFlow {
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
    config: AuthConfig,
    state: AuthState,
}

impl std::fmt::Debug for AuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthFlow")
            .field("config", &self.config)
            .field("is_authenticated", &self.state.is_authenticated)
            .finish_non_exhaustive()
    }
}

impl AuthFlow {
    /// Load config and state from the store.
    ///
    /// `default_config` is used when no config has been persisted. A stored
    /// state whose access token is missing, expired or undecodable is
    /// replaced by the signed-out state.
    pub fn new(
        store: CredentialStore,
        transport: Arc<dyn HttpTransport>,
        default_config: AuthConfig,
    ) -> Self {
        let config = store.load_config().unwrap_or(default_config);
        let stored = store.load_state();
        let state = Self::validate_loaded(stored);

        let flow = Self {
            transport,
            store,
            config,
            state,
        };
        flow.persist_state();
        flow
    }

    fn validate_loaded(stored: AuthState) -> AuthState {
        match stored.access_token.as_deref() {
            Some(token) if !is_token_expired(token) => AuthState {
                is_authenticated: true,
                ..stored
            },
            Some(_) => {
                info!("Stored access token expired, signing out");
                AuthState::default()
            }
            None => AuthState::default(),
        }
    }

    /// Current auth config.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Current auth state.
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Whether a user is signed in.
    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated
    }

    /// Replace the auth config and persist it.
    pub fn update_config(&mut self, config: AuthConfig) -> AuthResult<()> {
        self.store.save_config(&config)?;
        self.config = config;
        Ok(())
    }

    /// Use `config` for this run without persisting it.
    pub fn override_config(&mut self, config: AuthConfig) {
        self.config = config;
    }

    fn set_state(&mut self, state: AuthState) {
        self.state = state;
        self.persist_state();
    }

    fn persist_state(&self) {
        if let Err(e) = self.store.save_state(&self.state) {
            warn!(error = %e, "Failed to persist auth state");
        }
    }

    /// Start a login attempt and return the authorization URL to navigate to.
    ///
    /// The verifier and `state` are written to attempt-scoped storage,
    /// replacing any previous unfinished attempt.
    pub fn login(&mut self) -> AuthResult<String> {
        let pkce = Pkce::new()?;
        let state = generate_code_verifier()?;

        self.store.save_attempt(&LoginAttempt {
            code_verifier: pkce.verifier,
            state: state.clone(),
        })?;

        let url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&code_challenge={}&code_challenge_method=S256&state={}",
            self.config.authorize_url(),
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&self.config.scope),
            pkce.challenge,
            state
        );
        info!(issuer = %self.config.issuer_url, "Starting login");
        Ok(url)
    }

    /// Complete a login from the redirect URL the provider sent the browser to.
    ///
    /// The attempt's verifier is consumed whatever the outcome. On failure
    /// the state is reset to signed out.
    pub async fn handle_callback(&mut self, callback_url: &str) -> AuthResult<&AuthState> {
        match self.exchange_callback(callback_url).await {
            Ok(state) => {
                info!("Login complete");
                self.set_state(state);
                Ok(&self.state)
            }
            Err(e) => {
                warn!(error = %e, "Login callback failed");
                self.set_state(AuthState::default());
                Err(e)
            }
        }
    }

    async fn exchange_callback(&self, callback_url: &str) -> AuthResult<AuthState> {
        let params = CallbackParams::parse(callback_url);
        let attempt = self.store.take_attempt()?;

        if let Some(error) = params.error {
            return Err(AuthError::OAuth(error));
        }
        let code = params.code.ok_or(AuthError::MissingCode)?;
        let attempt = attempt.ok_or(AuthError::MissingVerifier)?;
        if params.state.as_deref() != Some(attempt.state.as_str()) {
            return Err(AuthError::StateMismatch);
        }

        let request = HttpRequest::post_form(
            self.config.token_url(),
            [
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("code", code.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code_verifier", attempt.code_verifier.as_str()),
            ],
        );
        let tokens = self
            .request_tokens(request)
            .await
            .map_err(AuthError::TokenExchange)?;

        let user = self
            .fetch_user(&tokens.access_token)
            .await
            .map_err(AuthError::UserInfoFetch)?;

        Ok(AuthState::authenticated(
            user,
            tokens.access_token,
            tokens.refresh_token,
        ))
    }

    /// Exchange the refresh token for new tokens and re-fetch the user.
    ///
    /// Returns `false` without contacting the provider when no refresh token
    /// is held. Any failure signs the user out.
    pub async fn refresh(&mut self) -> AuthResult<bool> {
        let Some(refresh_token) = self.state.refresh_token.clone() else {
            debug!("No refresh token held, skipping refresh");
            return Ok(false);
        };

        match self.refresh_with(&refresh_token).await {
            Ok(state) => {
                info!("Access token refreshed");
                self.set_state(state);
                Ok(true)
            }
            Err(detail) => {
                warn!(error = %detail, "Token refresh failed, signing out");
                self.set_state(AuthState::default());
                Err(AuthError::Refresh(detail))
            }
        }
    }

    async fn refresh_with(&self, refresh_token: &str) -> Result<AuthState, String> {
        let request = HttpRequest::post_form(
            self.config.token_url(),
            [
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("refresh_token", refresh_token),
            ],
        );
        let tokens = self.request_tokens(request).await?;
        let user = self.fetch_user(&tokens.access_token).await?;

        // Providers that do not rotate refresh tokens omit it from the response.
        let next_refresh = tokens
            .refresh_token
            .unwrap_or_else(|| refresh_token.to_string());

        Ok(AuthState::authenticated(
            user,
            tokens.access_token,
            Some(next_refresh),
        ))
    }

    /// Sign out and return the end-session URL to navigate to.
    ///
    /// Revocation is best effort; local state is always cleared.
    pub async fn logout(&mut self) -> String {
        if let Some(token) = self.state.access_token.clone() {
            if let Err(e) = self.revoke(&token).await {
                warn!(error = %e, "Failed to revoke token");
            }
        }

        self.state = AuthState::default();
        if let Err(e) = self.store.clear_state() {
            warn!(error = %e, "Failed to clear auth state");
        }
        info!("Logged out");

        format!(
            "{}?post_logout_redirect_uri={}",
            self.config.end_session_url(),
            urlencoding::encode(&self.config.app_origin())
        )
    }

    async fn revoke(&self, token: &str) -> Result<(), String> {
        let request = HttpRequest::post_form(
            self.config.revoke_url(),
            [("token", token), ("client_id", self.config.client_id.as_str())],
        )
        .bearer(token);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("{} {}", response.status, response.status_text));
        }
        Ok(())
    }

    async fn request_tokens(&self, request: HttpRequest) -> Result<TokenResponse, String> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("{} {}", response.status, response.status_text));
        }

        let body = response.bytes().await.map_err(|e| e.to_string())?;
        serde_json::from_slice(&body).map_err(|e| format!("invalid token response: {}", e))
    }

    async fn fetch_user(&self, access_token: &str) -> Result<User, String> {
        let request = HttpRequest::get(self.config.userinfo_url()).bearer(access_token);
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("{} {}", response.status, response.status_text));
        }

        let body = response.bytes().await.map_err(|e| e.to_string())?;
        let info: UserInfo = serde_json::from_slice(&body)
            .map_err(|e| format!("invalid userinfo response: {}", e))?;
        Ok(User::from(info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_params_parse() {
        let params = CallbackParams::parse("https://app/callback?code=abc123&state=xyz");
        assert_eq!(params.code.as_deref(), Some("abc123"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.error.is_none());
    }

    #[test]
    fn test_callback_params_decode_values() {
        let params =
            CallbackParams::parse("https://app/callback?error=access_denied&state=a%2Bb");
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.state.as_deref(), Some("a+b"));
    }

    #[test]
    fn test_callback_params_unparseable() {
        let params = CallbackParams::parse("not a url");
        assert!(params.code.is_none());
        assert!(params.error.is_none());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AuthError::OAuth("access_denied".to_string()).to_string(),
            "OAuth error: access_denied"
        );
        assert_eq!(
            AuthError::MissingVerifier.to_string(),
            "No code verifier found"
        );
    }
}
