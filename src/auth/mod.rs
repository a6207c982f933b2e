//! Authentication: OAuth 2.0 Authorization Code + PKCE login against an OIDC
//! identity provider, token refresh, logout, and credential persistence.

mod flow;
mod jwt;
mod pkce;
mod storage;
mod types;

pub use flow::{AuthError, AuthFlow, AuthResult};
pub use jwt::{is_token_expired, is_token_expired_at};
pub use pkce::{generate_code_challenge, generate_code_verifier, Pkce, PkceError};
pub use storage::CredentialStore;
pub use types::{AuthConfig, AuthState, LoginAttempt, TokenResponse, User, UserInfo};
