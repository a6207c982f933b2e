//! Auth configuration, state, and identity-provider wire types.

use serde::{Deserialize, Serialize};

/// Identity provider connection settings.
///
/// Replaced wholesale on edit. URLs are not validated here; a bad issuer
/// shows up as an HTTP failure during the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthConfig {
    /// Base URL of the identity provider, e.g. `https://auth.example.com`.
    pub issuer_url: String,
    /// OAuth client ID registered with the provider.
    pub client_id: String,
    /// Where the provider sends the browser after authorization.
    pub redirect_uri: String,
    /// Space-separated scopes.
    pub scope: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer_url: "https://auth.example.com".to_string(),
            client_id: "yapper-client".to_string(),
            redirect_uri: "http://localhost:8080/callback".to_string(),
            scope: "openid profile email".to_string(),
        }
    }
}

impl AuthConfig {
    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/application/o/{}/",
            self.issuer_url.trim_end_matches('/'),
            path
        )
    }

    /// Authorization endpoint.
    pub fn authorize_url(&self) -> String {
        self.endpoint("authorize")
    }

    /// Token endpoint (code exchange and refresh).
    pub fn token_url(&self) -> String {
        self.endpoint("token")
    }

    /// Userinfo endpoint.
    pub fn userinfo_url(&self) -> String {
        self.endpoint("userinfo")
    }

    /// Token revocation endpoint.
    pub fn revoke_url(&self) -> String {
        self.endpoint("revoke")
    }

    /// End-session endpoint.
    pub fn end_session_url(&self) -> String {
        self.endpoint("end-session")
    }

    /// Apply per-run overrides from a variable lookup.
    ///
    /// Recognised: `YAPPER_ISSUER_URL`, `YAPPER_CLIENT_ID`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(issuer) = lookup("YAPPER_ISSUER_URL") {
            self.issuer_url = issuer;
        }
        if let Some(client_id) = lookup("YAPPER_CLIENT_ID") {
            self.client_id = client_id;
        }
    }

    /// Origin of the application, derived from the redirect URI.
    ///
    /// Falls back to the redirect URI itself when it cannot be parsed.
    pub fn app_origin(&self) -> String {
        match reqwest::Url::parse(&self.redirect_uri) {
            Ok(url) => url.origin().ascii_serialization(),
            Err(_) => self.redirect_uri.clone(),
        }
    }
}

/// Signed-in user, built from identity-provider claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl From<UserInfo> for User {
    fn from(info: UserInfo) -> Self {
        let email = info.email.unwrap_or_default();
        let username = info
            .preferred_username
            .clone()
            .unwrap_or_else(|| email.clone());
        let name = info
            .name
            .or(info.preferred_username)
            .unwrap_or_default();

        Self {
            id: info.sub,
            username,
            email,
            name,
            avatar: info.picture,
        }
    }
}

/// Current authentication state.
///
/// `is_authenticated` is only true while an access token is held; the
/// controller enforces this on load and on every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthState {
    pub is_authenticated: bool,
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl AuthState {
    /// Build an authenticated state from one token exchange.
    pub fn authenticated(user: User, access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            is_authenticated: true,
            user: Some(user),
            access_token: Some(access_token),
            refresh_token,
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Userinfo endpoint response (the claims we consume).
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Secrets of one in-progress login, kept in attempt-scoped storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub code_verifier: String,
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_trim_trailing_slash() {
        let config = AuthConfig {
            issuer_url: "https://auth.example.com/".to_string(),
            ..AuthConfig::default()
        };
        assert_eq!(
            config.token_url(),
            "https://auth.example.com/application/o/token/"
        );
        assert_eq!(
            config.end_session_url(),
            "https://auth.example.com/application/o/end-session/"
        );
    }

    #[test]
    fn test_app_origin() {
        let config = AuthConfig {
            redirect_uri: "https://app.example.com:8443/callback?x=1".to_string(),
            ..AuthConfig::default()
        };
        assert_eq!(config.app_origin(), "https://app.example.com:8443");
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = AuthConfig::default();
        config.apply_overrides(|name| match name {
            "YAPPER_CLIENT_ID" => Some("c1".to_string()),
            _ => None,
        });
        assert_eq!(config.client_id, "c1");
        assert_eq!(config.issuer_url, "https://auth.example.com");
    }

    #[test]
    fn test_user_from_userinfo_fallbacks() {
        let info: UserInfo = serde_json::from_str(
            r#"{"sub":"u1","email":"ada@example.com","preferred_username":"ada"}"#,
        )
        .unwrap();
        let user = User::from(info);
        assert_eq!(user.id, "u1");
        assert_eq!(user.username, "ada");
        assert_eq!(user.name, "ada");
        assert_eq!(user.avatar, None);

        let info: UserInfo =
            serde_json::from_str(r#"{"sub":"u2","email":"bob@example.com","name":"Bob"}"#)
                .unwrap();
        let user = User::from(info);
        assert_eq!(user.username, "bob@example.com");
        assert_eq!(user.name, "Bob");
    }

    #[test]
    fn test_auth_config_partial_json_merges_defaults() {
        let config: AuthConfig = serde_json::from_str(r#"{"clientId":"c1"}"#).unwrap();
        assert_eq!(config.client_id, "c1");
        assert_eq!(config.issuer_url, "https://auth.example.com");
        assert_eq!(config.scope, "openid profile email");
    }

    #[test]
    fn test_auth_state_serialization_uses_camel_case() {
        let state = AuthState::default();
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"isAuthenticated\":false"));
        assert!(json.contains("\"accessToken\":null"));
    }
}
