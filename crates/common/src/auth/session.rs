//! Authorization session
//!
//! Owns the single in-flight login attempt and the tokens it produced.
//! `login` records a [`PendingAuthorization`] and opens the provider's
//! authorize page; whichever transport receives the redirect hands the raw
//! URL to `handle_callback`, which validates it in a fixed order and performs
//! the code exchange.
//!
//! Session state sits behind one `parking_lot::Mutex` that is never held
//! across an `.await`. The pending record is taken out of the mutex before
//! the token request is sent, so a redirect delivered twice (scheme listener
//! and loopback server, or a replayed second-instance launch) is exchanged at
//! most once.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use loopgate_domain::constants::{CALLBACK_PATH, STATE_TIMEOUT_SECS, TOKEN_EXPIRY_GRACE_SECS};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use super::error::AuthError;
use super::pkce;
use super::traits::{BrowserLauncher, CallbackHandler};
use super::types::{AuthorizationPhase, OAuthConfig, OAuthErrorResponse, TokenResponse, TokenSet};
use crate::observability::{fingerprint, SensitiveLogging};
use crate::security::SecretString;
use crate::time::{Clock, SystemClock};

const HTTP_TIMEOUT_SECS: u64 = 30;

/// A login attempt waiting for its redirect
#[derive(Debug)]
pub struct PendingAuthorization {
    state: SecretString,
    code_verifier: SecretString,
    redirect_uri: String,
    created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    /// Whether the attempt is older than the state timeout at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::seconds(STATE_TIMEOUT_SECS)
    }

    /// Redirect URI sent in the authorize request
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }
}

#[derive(Debug, Default)]
struct SessionState {
    pending: Option<PendingAuthorization>,
    tokens: Option<TokenSet>,
    callback_port: Option<u16>,
}

/// Query parameters the provider may put on a redirect
#[derive(Debug, Default)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl RedirectParams {
    fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() && !value.is_empty() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    code: &'a str,
    code_verifier: &'a str,
    redirect_uri: &'a str,
}

/// Desktop OAuth 2.0 Authorization Code + PKCE session
///
/// Construct once, wrap in an `Arc` and share it with every callback
/// transport through [`CallbackHandler`].
pub struct AuthorizationSession {
    config: OAuthConfig,
    http: Client,
    browser: Arc<dyn BrowserLauncher>,
    clock: Arc<dyn Clock>,
    logging: SensitiveLogging,
    inner: Mutex<SessionState>,
}

impl std::fmt::Debug for AuthorizationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationSession")
            .field("domain", &self.config.domain)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl AuthorizationSession {
    /// Create a session for the given provider
    ///
    /// Uses the system clock, quiet logging and an HTTP client with a 30
    /// second timeout. Override with the `with_*` builders.
    #[must_use]
    pub fn new(config: OAuthConfig, browser: Arc<dyn BrowserLauncher>) -> Self {
        let http = Client::builder()
            .timeout(StdDuration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            config,
            http,
            browser,
            clock: Arc::new(SystemClock),
            logging: SensitiveLogging::quiet(),
            inner: Mutex::new(SessionState::default()),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    #[must_use]
    pub fn with_logging(mut self, logging: SensitiveLogging) -> Self {
        self.logging = logging;
        self
    }

    /// Provider configuration
    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Start a login.
    ///
    /// Generates a fresh PKCE pair and state, replaces any attempt already in
    /// flight, and opens the authorize URL in the browser. Returns the URL
    /// that was opened.
    ///
    /// # Errors
    /// - `AuthError::Pkce` if secure randomness is unavailable
    /// - `AuthError::BrowserLaunchFailed` if the browser could not be opened;
    ///   the attempt is discarded in that case
    pub fn login(&self) -> Result<String, AuthError> {
        let pair = pkce::generate_pair()?;
        let state = pkce::generate_state()?;
        let state_fp = fingerprint(state.expose());

        let redirect_uri = self.redirect_uri();
        let authorize_url = self.authorize_url(pair.challenge(), state.expose(), &redirect_uri);

        if self.logging.is_verbose() {
            debug!(
                event = "auth.pkce_generated",
                verifier = %self.logging.render(pair.verifier().expose()),
                challenge = %self.logging.render(pair.challenge()),
                "Generated PKCE pair"
            );
        }

        let (code_verifier, _) = pair.into_parts();
        let issued_state = state.clone();
        let superseded = self
            .inner
            .lock()
            .pending
            .replace(PendingAuthorization {
                state,
                code_verifier,
                redirect_uri: redirect_uri.clone(),
                created_at: self.clock.now(),
            })
            .is_some();

        info!(
            event = "auth.login_started",
            state_fp = %state_fp,
            redirect_uri = %redirect_uri,
            superseded,
            "Starting authorization"
        );

        if let Err(reason) = self.browser.open(&authorize_url) {
            let mut inner = self.inner.lock();
            let ours = inner
                .pending
                .as_ref()
                .is_some_and(|p| p.state.constant_time_eq(issued_state.expose()));
            if ours {
                inner.pending = None;
            }
            drop(inner);
            warn!(event = "auth.browser_launch_failed", error = %reason, "Could not open browser");
            return Err(AuthError::BrowserLaunchFailed(reason));
        }

        Ok(authorize_url)
    }

    /// Validate an authorization redirect and exchange its code for tokens.
    ///
    /// Checks run in this order:
    /// 1. the URL must parse (`MalformedRedirect`, pending attempt kept)
    /// 2. a login must be in flight (`InvalidState`)
    /// 3. an `error` parameter ends the attempt (`ProviderDenied`)
    /// 4. `state` must match and be younger than ten minutes (`InvalidState`)
    /// 5. the attempt is consumed; `code` must be present and non-empty (`MissingCode`)
    /// 6. the token request must succeed (`TokenExchangeFailed`)
    ///
    /// # Errors
    /// Returns the `AuthError` for the first check that fails.
    pub async fn handle_callback(&self, redirect_url: &str) -> Result<TokenSet, AuthError> {
        let url = Url::parse(redirect_url).map_err(|_| {
            warn!(
                event = "auth.callback_rejected",
                reason = "malformed_redirect",
                "Unparseable redirect"
            );
            AuthError::MalformedRedirect
        })?;
        let params = RedirectParams::from_url(&url);

        let pending = self.take_matching_pending(&params).inspect_err(|err| {
            let state_fp = params.state.as_deref().map(fingerprint).unwrap_or_default();
            warn!(
                event = "auth.callback_rejected",
                reason = err.label(),
                state_fp = %state_fp,
                "Authorization redirect rejected"
            );
        })?;

        let Some(code) = params.code else {
            warn!(event = "auth.callback_rejected", reason = "missing_code", "Redirect had no code");
            return Err(AuthError::MissingCode);
        };

        if self.logging.is_verbose() {
            debug!(
                event = "auth.exchanging_code",
                code = %self.logging.render(&code),
                redirect_uri = %pending.redirect_uri,
                "Exchanging authorization code"
            );
        }

        let tokens = self.exchange_code(&code, &pending).await.inspect_err(|err| {
            warn!(event = "auth.token_exchange_failed", error = %err, "Token exchange failed");
        })?;

        self.inner.lock().tokens = Some(tokens.clone());

        info!(
            event = "auth.login_completed",
            expires_at = %tokens.expires_at,
            has_refresh_token = tokens.refresh_token.is_some(),
            has_id_token = tokens.id_token.is_some(),
            "Authorization completed"
        );

        Ok(tokens)
    }

    /// Current tokens, if a login has completed
    #[must_use]
    pub fn get_tokens(&self) -> Option<TokenSet> {
        self.inner.lock().tokens.clone()
    }

    /// Whether tokens are held and stay valid for at least another minute
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        let inner = self.inner.lock();
        let Some(tokens) = inner.tokens.as_ref() else {
            return false;
        };

        let now = self.clock.now();
        if tokens.is_expired_at(now, TOKEN_EXPIRY_GRACE_SECS) {
            warn!(
                event = "auth.token_expired",
                expires_at = %tokens.expires_at,
                "Access token expired or about to expire"
            );
            return false;
        }

        true
    }

    /// Forget tokens and any login in flight.
    pub fn logout(&self) {
        let mut inner = self.inner.lock();
        let had_tokens = inner.tokens.take().is_some();
        let had_pending = inner.pending.take().is_some();
        drop(inner);

        info!(event = "auth.logout", had_tokens, had_pending, "Session cleared");
    }

    /// Register (or clear) the loopback port redirects should target.
    pub fn set_callback_port(&self, port: Option<u16>) {
        self.inner.lock().callback_port = port;
        debug!(event = "auth.callback_port_set", port, "Callback port updated");
    }

    #[must_use]
    pub fn callback_port(&self) -> Option<u16> {
        self.inner.lock().callback_port
    }

    /// Redirect URI the next login will send
    ///
    /// `http://127.0.0.1:<port>/callback` while a loopback port is
    /// registered, the configured redirect otherwise.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        match self.inner.lock().callback_port {
            Some(port) => format!("http://127.0.0.1:{port}{CALLBACK_PATH}"),
            None => self.config.redirect_uri.clone(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> AuthorizationPhase {
        let inner = self.inner.lock();
        if inner.pending.is_some() {
            AuthorizationPhase::AwaitingCallback
        } else if inner.tokens.is_some() {
            AuthorizationPhase::Authenticated
        } else {
            AuthorizationPhase::Idle
        }
    }

    #[must_use]
    pub fn has_pending_login(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    fn authorize_url(&self, challenge: &str, state: &str, redirect_uri: &str) -> String {
        let mut params = vec![
            ("client_id", self.config.client_id.clone()),
            ("redirect_uri", redirect_uri.to_string()),
            ("response_type", "code".to_string()),
            ("code_challenge", challenge.to_string()),
            ("code_challenge_method", pkce::CHALLENGE_METHOD.to_string()),
            ("state", state.to_string()),
            ("scope", self.config.scope_string()),
        ];

        if let Some(audience) = &self.config.audience {
            params.push(("audience", audience.clone()));
        }

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", self.config.authorization_url(), query_string)
    }

    /// Steps 2-4 of `handle_callback`, under the lock.
    fn take_matching_pending(
        &self,
        params: &RedirectParams,
    ) -> Result<PendingAuthorization, AuthError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let Some(pending) = inner.pending.as_ref() else {
            return Err(AuthError::InvalidState);
        };

        if let Some(error) = &params.error {
            inner.pending = None;
            return Err(AuthError::ProviderDenied {
                error: error.clone(),
                description: params.error_description.clone(),
            });
        }

        let state_matches =
            params.state.as_deref().is_some_and(|state| pending.state.constant_time_eq(state));
        if !state_matches || pending.is_expired(now) {
            inner.pending = None;
            return Err(AuthError::InvalidState);
        }

        inner.pending.take().ok_or(AuthError::InvalidState)
    }

    async fn exchange_code(
        &self,
        code: &str,
        pending: &PendingAuthorization,
    ) -> Result<TokenSet, AuthError> {
        let body = TokenRequest {
            grant_type: "authorization_code",
            client_id: &self.config.client_id,
            code,
            code_verifier: pending.code_verifier.expose(),
            redirect_uri: &pending.redirect_uri,
        };

        let response = self
            .http
            .post(self.config.token_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<OAuthErrorResponse>(&text)
                .map_or_else(|_| format!("HTTP {status}"), |err| format!("HTTP {status}: {err}"));
            return Err(AuthError::TokenExchangeFailed(detail));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(format!("invalid token response: {e}")))?;

        if token_response.expires_in.is_none() {
            warn!(
                event = "auth.token_lifetime_defaulted",
                "Token response had no expires_in; assuming one hour"
            );
        }

        TokenSet::from_response(token_response, self.clock.now())
    }
}

#[async_trait]
impl CallbackHandler for AuthorizationSession {
    async fn handle_callback(&self, redirect_url: &str) -> Result<TokenSet, AuthError> {
        Self::handle_callback(self, redirect_url).await
    }

    fn register_callback_port(&self, port: Option<u16>) {
        self.set_callback_port(port);
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::session.
    //!
    //! Everything here fails before the token request; exchanges against a
    //! mock token endpoint live in `tests/auth_integration.rs`.
    use super::*;
    use crate::testing::{query_param, MockBrowser};
    use crate::time::MockClock;

    fn config() -> OAuthConfig {
        OAuthConfig::new(
            "dev-test.us.auth0.com".to_string(),
            "client123".to_string(),
            "loopgate://callback".to_string(),
            vec!["openid".to_string(), "profile".to_string()],
            Some("https://api.example.com".to_string()),
        )
    }

    fn session() -> (AuthorizationSession, MockBrowser, MockClock) {
        let browser = MockBrowser::new();
        let clock = MockClock::new();
        let session = AuthorizationSession::new(config(), Arc::new(browser.clone()))
            .with_clock(Arc::new(clock.clone()));
        (session, browser, clock)
    }

    fn start_login(session: &AuthorizationSession) -> String {
        let url = session.login().expect("login");
        query_param(&url, "state").expect("state param")
    }

    /// Validates `AuthorizationSession::login` for the authorize URL
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the browser was asked to open exactly the returned URL.
    /// - Confirms every required query parameter is present.
    /// - Ensures the phase becomes `AwaitingCallback`.
    #[test]
    fn test_login_builds_authorize_url() {
        let (session, browser, _) = session();

        let url = session.login().expect("login");

        assert_eq!(browser.opened(), vec![url.clone()]);
        assert!(url.starts_with("https://dev-test.us.auth0.com/authorize?"));
        assert_eq!(query_param(&url, "client_id").as_deref(), Some("client123"));
        assert_eq!(query_param(&url, "redirect_uri").as_deref(), Some("loopgate://callback"));
        assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
        assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));
        assert_eq!(query_param(&url, "scope").as_deref(), Some("openid profile"));
        assert_eq!(query_param(&url, "audience").as_deref(), Some("https://api.example.com"));
        assert_eq!(query_param(&url, "code_challenge").map(|c| c.len()), Some(43));
        assert_eq!(query_param(&url, "state").map(|s| s.len()), Some(43));
        assert_eq!(session.phase(), AuthorizationPhase::AwaitingCallback);
    }

    #[test]
    fn test_login_supersedes_previous_attempt() {
        let (session, _, _) = session();

        let first = start_login(&session);
        let second = start_login(&session);

        assert_ne!(first, second);
        assert!(session.has_pending_login());
    }

    #[test]
    fn test_registered_port_changes_redirect_uri() {
        let (session, _, _) = session();

        session.set_callback_port(Some(52847));
        let url = session.login().expect("login");
        assert_eq!(
            query_param(&url, "redirect_uri").as_deref(),
            Some("http://127.0.0.1:52847/callback")
        );

        session.set_callback_port(None);
        assert_eq!(session.redirect_uri(), "loopgate://callback");
    }

    /// Validates `AuthorizationSession::login` for the browser failure
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `BrowserLaunchFailed` is returned.
    /// - Ensures no pending login is left behind.
    #[test]
    fn test_browser_failure_discards_attempt() {
        let (session, browser, _) = session();
        browser.fail_with("no browser");

        let err = session.login().unwrap_err();

        assert!(matches!(err, AuthError::BrowserLaunchFailed(ref r) if r == "no browser"));
        assert!(!session.has_pending_login());
    }

    #[tokio::test]
    async fn test_callback_without_login_is_invalid_state() {
        let (session, _, _) = session();

        let err = session.handle_callback("loopgate://callback?code=abc&state=xyz").await;

        assert!(matches!(err, Err(AuthError::InvalidState)));
    }

    /// Validates `AuthorizationSession::handle_callback` for the provider
    /// error scenario.
    ///
    /// Assertions:
    /// - Confirms `ProviderDenied` carries the error and description.
    /// - Ensures the pending attempt is cleared even though no state was sent.
    #[tokio::test]
    async fn test_provider_error_wins_over_missing_state() {
        let (session, _, _) = session();
        start_login(&session);

        let err = session
            .handle_callback(
                "loopgate://callback?error=access_denied&error_description=User%20cancelled",
            )
            .await
            .unwrap_err();

        match err {
            AuthError::ProviderDenied { error, description } => {
                assert_eq!(error, "access_denied");
                assert_eq!(description.as_deref(), Some("User cancelled"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!session.has_pending_login());
        assert_eq!(session.phase(), AuthorizationPhase::Idle);
    }

    #[tokio::test]
    async fn test_wrong_state_clears_pending() {
        let (session, _, _) = session();
        start_login(&session);

        let err = session.handle_callback("loopgate://callback?code=abc&state=forged").await;

        assert!(matches!(err, Err(AuthError::InvalidState)));
        assert!(!session.has_pending_login());
    }

    #[tokio::test]
    async fn test_wrong_state_without_code_is_invalid_state() {
        let (session, _, _) = session();
        start_login(&session);

        let err = session.handle_callback("loopgate://callback?state=forged").await;

        assert!(matches!(err, Err(AuthError::InvalidState)));
    }

    /// Validates the ten minute state timeout.
    ///
    /// Assertions:
    /// - Ensures a correct state older than ten minutes is `InvalidState`.
    #[tokio::test]
    async fn test_expired_state_is_rejected() {
        let (session, _, clock) = session();
        let state = start_login(&session);

        clock.advance_secs(STATE_TIMEOUT_SECS + 1);
        let err = session
            .handle_callback(&format!("loopgate://callback?code=abc&state={state}"))
            .await;

        assert!(matches!(err, Err(AuthError::InvalidState)));
        assert!(!session.has_pending_login());
    }

    #[tokio::test]
    async fn test_missing_code_consumes_attempt() {
        let (session, _, _) = session();
        let state = start_login(&session);
        let redirect = format!("loopgate://callback?state={state}");

        let first = session.handle_callback(&redirect).await;
        let second = session.handle_callback(&redirect).await;

        assert!(matches!(first, Err(AuthError::MissingCode)));
        assert!(matches!(second, Err(AuthError::InvalidState)));
    }

    #[tokio::test]
    async fn test_malformed_redirect_keeps_pending() {
        let (session, _, _) = session();
        start_login(&session);

        let err = session.handle_callback("not a url").await;

        assert!(matches!(err, Err(AuthError::MalformedRedirect)));
        assert!(session.has_pending_login());
    }

    #[test]
    fn test_logout_clears_everything() {
        let (session, _, _) = session();
        start_login(&session);

        session.logout();

        assert_eq!(session.phase(), AuthorizationPhase::Idle);
        assert!(session.get_tokens().is_none());
        assert!(!session.is_authenticated());
    }
}
