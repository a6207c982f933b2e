//! PKCE (Proof Key for Code Exchange) for the OAuth 2.0 authorization code flow.
//!
//! The verifier is held locally for one login attempt; only its S256 challenge
//! crosses the browser redirect.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Number of random bytes behind a code verifier (43 base64url characters).
const VERIFIER_BYTES: usize = 32;

/// PKCE generation errors.
#[derive(Debug, Error)]
pub enum PkceError {
    /// The operating system random source could not be read.
    #[error("Secure random source unavailable: {0}")]
    RandomUnavailable(#[from] rand::Error),
}

/// PKCE verifier and challenge pair.
#[derive(Debug, Clone)]
pub struct Pkce {
    /// Code verifier - base64url of 32 random bytes, unpadded.
    pub verifier: String,
    /// Code challenge - base64url(sha256(verifier)), unpadded.
    pub challenge: String,
}

impl Pkce {
    /// Generate a new PKCE verifier and challenge pair.
    pub fn new() -> Result<Self, PkceError> {
        let verifier = generate_code_verifier()?;
        let challenge = generate_code_challenge(&verifier);

        Ok(Self {
            verifier,
            challenge,
        })
    }
}

/// Generate a code verifier from the OS random source.
///
/// Also used for the opaque anti-CSRF `state` value. There is no
/// pseudo-random fallback: if the OS source fails, the error propagates.
pub fn generate_code_verifier() -> Result<String, PkceError> {
    let mut bytes = [0u8; VERIFIER_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Compute the S256 challenge for a verifier: base64url(sha256(verifier)).
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let hash = hasher.finalize();

    URL_SAFE_NO_PAD.encode(hash)
}
