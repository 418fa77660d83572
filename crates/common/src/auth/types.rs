//! OAuth 2.0 types and structures
//!
//! Provider configuration, the in-memory token set, and the wire formats of
//! the token endpoint.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use loopgate_domain::constants::DEFAULT_TOKEN_LIFETIME_SECS;
use loopgate_domain::AppConfig;
use serde::Deserialize;

use super::error::AuthError;
use crate::security::SecretString;

/// Access, refresh and ID tokens returned by a successful code exchange
///
/// Lives only in process memory. Secrets are zeroed when the set is dropped
/// and redacted from `Debug`.
#[derive(Debug, Clone)]
pub struct TokenSet {
    /// Bearer token for API calls
    pub access_token: SecretString,

    /// Refresh token, present when `offline_access` was granted
    pub refresh_token: Option<SecretString>,

    /// OpenID Connect ID token (JWT)
    pub id_token: Option<SecretString>,

    /// Access token lifetime in seconds as reported (or defaulted)
    pub expires_in: i64,

    /// Absolute expiration timestamp, `issued_at + expires_in`
    pub expires_at: DateTime<Utc>,

    /// Granted scopes (space-separated), when the provider echoes them
    pub scope: Option<String>,
}

impl TokenSet {
    /// Build a token set from a token endpoint response received at
    /// `issued_at`.
    ///
    /// A missing `expires_in` falls back to one hour.
    ///
    /// # Errors
    /// Returns `AuthError::TokenExchangeFailed` when `expires_in` is negative
    /// or the expiry does not fit in a timestamp.
    pub fn from_response(
        response: TokenResponse,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let expires_at = (expires_in >= 0)
            .then(|| Duration::try_seconds(expires_in))
            .flatten()
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthError::TokenExchangeFailed(format!("invalid expires_in: {expires_in}"))
            })?;

        Ok(Self {
            access_token: SecretString::new(response.access_token),
            refresh_token: response.refresh_token.map(SecretString::new),
            id_token: response.id_token.map(SecretString::new),
            expires_in,
            expires_at,
            scope: response.scope,
        })
    }

    /// Check if the access token is expired, or expires within
    /// `grace_seconds` of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, grace_seconds: i64) -> bool {
        now + Duration::seconds(grace_seconds) >= self.expires_at
    }

    /// Seconds until `expires_at`; negative once expired
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }
}

/// OAuth token response from authorization server
///
/// Standard OAuth 2.0 token response format (RFC 6749 §5.1).
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

/// OAuth error response from authorization server
///
/// Standard OAuth 2.0 error response format (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}

impl fmt::Display for OAuthErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

/// OAuth configuration for the identity provider
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Authorization server domain (e.g., "dev-abc123.us.auth0.com")
    pub domain: String,

    /// Public client ID (no client secret for desktop apps)
    pub client_id: String,

    /// Redirect URI used when no loopback port is registered
    pub redirect_uri: String,

    /// OAuth scopes to request
    pub scopes: Vec<String>,

    /// API identifier, used by Auth0-style providers
    pub audience: Option<String>,

    /// Overrides `https://{domain}` as the endpoint origin
    pub endpoint_base: Option<String>,
}

impl OAuthConfig {
    /// Create a new OAuth configuration
    #[must_use]
    pub fn new(
        domain: String,
        client_id: String,
        redirect_uri: String,
        scopes: Vec<String>,
        audience: Option<String>,
    ) -> Self {
        Self { domain, client_id, redirect_uri, scopes, audience, endpoint_base: None }
    }

    /// Build the provider configuration from application settings.
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            config.auth.domain.clone(),
            config.auth.client_id.clone(),
            config.redirect_uri(),
            config.auth.scopes.clone(),
            config.auth.audience.clone().filter(|a| !a.trim().is_empty()),
        )
    }

    /// Point the endpoints at a different origin (a local mock server).
    #[must_use]
    pub fn with_endpoint_base(mut self, base: impl Into<String>) -> Self {
        self.endpoint_base = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    fn base(&self) -> String {
        self.endpoint_base.clone().unwrap_or_else(|| format!("https://{}", self.domain))
    }

    /// Get the authorization URL, `https://{domain}/authorize`
    #[must_use]
    pub fn authorization_url(&self) -> String {
        format!("{}/authorize", self.base())
    }

    /// Get the token URL, `https://{domain}/oauth/token`
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base())
    }

    /// Get scopes as space-separated string
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Where the session is in the authorization lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationPhase {
    /// No login in flight and no tokens held
    Idle,
    /// A login was started and its redirect has not arrived yet
    AwaitingCallback,
    /// Tokens from a successful exchange are held
    Authenticated,
}
