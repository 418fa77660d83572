//! Errors surfaced by the authorization flow

use loopgate_domain::LoopgateError;
use thiserror::Error;

use super::pkce::PkceError;

/// Error type for authorization session operations
#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider redirected back with an `error` parameter
    #[error("authorization denied by provider: {error}{}", describe(.description))]
    ProviderDenied { error: String, description: Option<String> },

    /// No matching login in flight, state mismatch, or the attempt expired
    #[error("invalid or expired authorization state")]
    InvalidState,

    /// Redirect carried a valid state but no authorization code
    #[error("authorization code missing from redirect")]
    MissingCode,

    /// Token endpoint rejected the code or could not be reached
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The redirect URL could not be parsed
    #[error("redirect URL could not be parsed")]
    MalformedRedirect,

    /// The system browser could not be opened
    #[error("failed to open browser: {0}")]
    BrowserLaunchFailed(String),

    #[error(transparent)]
    Pkce(#[from] PkceError),
}

fn describe(description: &Option<String>) -> String {
    description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
}

impl AuthError {
    /// Whether starting a fresh login can be expected to succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidState | Self::TokenExchangeFailed(_) | Self::BrowserLaunchFailed(_)
        )
    }

    /// Stable label for log fields
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ProviderDenied { .. } => "provider_denied",
            Self::InvalidState => "invalid_state",
            Self::MissingCode => "missing_code",
            Self::TokenExchangeFailed(_) => "token_exchange_failed",
            Self::MalformedRedirect => "malformed_redirect",
            Self::BrowserLaunchFailed(_) => "browser_launch_failed",
            Self::Pkce(_) => "randomness_unavailable",
        }
    }
}

impl From<AuthError> for LoopgateError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExchangeFailed(_) => Self::Network(err.to_string()),
            AuthError::BrowserLaunchFailed(_) => Self::Platform(err.to_string()),
            AuthError::Pkce(_) => Self::Security(err.to_string()),
            AuthError::ProviderDenied { .. }
            | AuthError::InvalidState
            | AuthError::MissingCode
            | AuthError::MalformedRedirect => Self::Auth(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::error.
    use super::*;

    #[test]
    fn test_provider_denied_display() {
        let with_description = AuthError::ProviderDenied {
            error: "access_denied".to_string(),
            description: Some("User cancelled".to_string()),
        };
        assert_eq!(
            with_description.to_string(),
            "authorization denied by provider: access_denied (User cancelled)"
        );

        let bare =
            AuthError::ProviderDenied { error: "access_denied".to_string(), description: None };
        assert_eq!(bare.to_string(), "authorization denied by provider: access_denied");
    }

    /// Validates `From<AuthError> for LoopgateError` for the category mapping
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures exchange failures map to `Network`.
    /// - Ensures state failures map to `Auth`.
    /// - Ensures randomness failures map to `Security`.
    #[test]
    fn test_conversion_to_domain_error() {
        let network: LoopgateError = AuthError::TokenExchangeFailed("503".to_string()).into();
        assert!(matches!(network, LoopgateError::Network(_)));

        let auth: LoopgateError = AuthError::InvalidState.into();
        assert!(matches!(auth, LoopgateError::Auth(_)));

        let security: LoopgateError =
            AuthError::Pkce(PkceError::RandomnessUnavailable("os".to_string())).into();
        assert!(matches!(security, LoopgateError::Security(_)));
    }

    #[test]
    fn test_retryable_and_labels() {
        assert!(AuthError::InvalidState.is_retryable());
        assert!(!AuthError::MissingCode.is_retryable());
        assert_eq!(AuthError::MalformedRedirect.label(), "malformed_redirect");
    }
}
