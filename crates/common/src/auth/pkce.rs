//! PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
//!
//! Implements RFC 7636 for public clients that cannot keep a client secret.
//! Every random value is drawn from the operating system CSPRNG; when that
//! source fails the error is returned to the caller instead of falling back
//! to a weaker generator.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroize;

use crate::security::{constant_time_eq, SecretString};

/// Code challenge method sent with every authorization request
pub const CHALLENGE_METHOD: &str = "S256";

/// 64 random bytes encode to 86 base64url characters (RFC 7636: 43-128)
const VERIFIER_BYTES: usize = 64;

/// 256-bit CSRF state token
const STATE_BYTES: usize = 32;

/// Errors from PKCE and state generation
#[derive(Debug, Error)]
pub enum PkceError {
    /// The OS random source could not produce bytes
    #[error("secure random source unavailable: {0}")]
    RandomnessUnavailable(String),
}

/// Verifier and its S256 challenge
///
/// The verifier is kept secret until the token exchange; the challenge goes
/// into the authorization URL.
#[derive(Debug, Clone)]
pub struct PkcePair {
    verifier: SecretString,
    challenge: String,
}

impl PkcePair {
    /// Code verifier, revealed only in the token request body
    #[must_use]
    pub fn verifier(&self) -> &SecretString {
        &self.verifier
    }

    /// `BASE64URL(SHA256(verifier))`
    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Always `"S256"`
    #[must_use]
    pub fn challenge_method(&self) -> &'static str {
        CHALLENGE_METHOD
    }

    /// Split into the verifier and the challenge.
    #[must_use]
    pub fn into_parts(self) -> (SecretString, String) {
        (self.verifier, self.challenge)
    }
}

/// Generate a fresh verifier/challenge pair.
///
/// # Errors
/// Returns `PkceError::RandomnessUnavailable` if the OS random source fails.
pub fn generate_pair() -> Result<PkcePair, PkceError> {
    let verifier = random_token(VERIFIER_BYTES)?;
    let challenge = derive_challenge(verifier.expose());
    Ok(PkcePair { verifier, challenge })
}

/// Generate a random state token for CSRF protection.
///
/// Independent of the verifier: 32 fresh random bytes, base64url encoded
/// (43 characters).
///
/// # Errors
/// Returns `PkceError::RandomnessUnavailable` if the OS random source fails.
pub fn generate_state() -> Result<SecretString, PkceError> {
    random_token(STATE_BYTES)
}

/// Generate code challenge from verifier using SHA-256
///
/// Per RFC 7636, the challenge is `BASE64URL(SHA256(ASCII(code_verifier)))`.
#[must_use]
pub fn derive_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Check that `challenge` was derived from `verifier`.
#[must_use]
pub fn verify_pair(verifier: &str, challenge: &str) -> bool {
    constant_time_eq(derive_challenge(verifier).as_bytes(), challenge.as_bytes())
}

fn random_token(len: usize) -> Result<SecretString, PkceError> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| PkceError::RandomnessUnavailable(e.to_string()))?;
    let encoded = URL_SAFE_NO_PAD.encode(&bytes);
    bytes.zeroize();
    Ok(SecretString::new(encoded))
}
