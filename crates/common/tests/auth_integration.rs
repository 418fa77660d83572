//! Integration tests for auth module
//!
//! Drives `AuthorizationSession` end to end against a `wiremock` token
//! endpoint: login, redirect validation, code exchange and token storage.

#![cfg(feature = "platform")]

use std::sync::Arc;

use chrono::Duration;
use loopgate_common::auth::{
    verify_pair, AuthError, AuthorizationPhase, AuthorizationSession, OAuthConfig,
};
use loopgate_common::testing::{query_param, MockBrowser, MockClock};
use loopgate_common::time::Clock;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: MockServer,
    session: Arc<AuthorizationSession>,
    clock: MockClock,
}

async fn harness() -> Harness {
    let server = MockServer::start().await;
    let config = OAuthConfig::new(
        "dev-test.us.auth0.com".to_string(),
        "client123".to_string(),
        "loopgate://callback".to_string(),
        vec!["openid".to_string(), "profile".to_string(), "offline_access".to_string()],
        None,
    )
    .with_endpoint_base(server.uri());

    let clock = MockClock::new();
    let session = AuthorizationSession::new(config, Arc::new(MockBrowser::new()))
        .with_clock(Arc::new(clock.clone()));

    Harness { server, session: Arc::new(session), clock }
}

async fn mount_token_success(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn tokens_abc() -> Value {
    json!({
        "access_token": "A",
        "refresh_token": "B",
        "id_token": "C",
        "token_type": "Bearer",
        "expires_in": 3600
    })
}

/// Validates the full login flow for the successful exchange scenario.
///
/// # Test Steps
/// 1. Start a login and read `state` / `code_challenge` from the authorize URL
/// 2. Deliver a redirect with `code=xyz` and the same state
/// 3. Check the stored tokens and the token request body
///
/// Assertions:
/// - Confirms the returned and stored tokens are `A` / `B` / `C`.
/// - Ensures `expires_at` is one hour after the exchange.
/// - Ensures the request carried `grant_type`, `client_id`, `code`,
///   `redirect_uri` and a verifier matching the challenge.
#[tokio::test(flavor = "multi_thread")]
async fn test_login_and_exchange_success() {
    let h = harness().await;
    mount_token_success(&h.server, tokens_abc()).await;

    let authorize_url = h.session.login().expect("login");
    let state = query_param(&authorize_url, "state").expect("state");
    let challenge = query_param(&authorize_url, "code_challenge").expect("challenge");

    let before = h.clock.now();
    let tokens = h
        .session
        .handle_callback(&format!("loopgate://callback?code=xyz&state={state}"))
        .await
        .expect("exchange succeeds");

    assert_eq!(tokens.access_token.expose(), "A");
    assert_eq!(tokens.refresh_token.as_ref().map(|t| t.expose()), Some("B"));
    assert_eq!(tokens.id_token.as_ref().map(|t| t.expose()), Some("C"));
    assert_eq!(tokens.expires_at, before + Duration::seconds(3600));

    let stored = h.session.get_tokens().expect("tokens stored");
    assert_eq!(stored.access_token.expose(), "A");
    assert_eq!(h.session.phase(), AuthorizationPhase::Authenticated);
    assert!(h.session.is_authenticated());

    let requests = h.server.received_requests().await.expect("request recording");
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");
    assert_eq!(body["grant_type"], "authorization_code");
    assert_eq!(body["client_id"], "client123");
    assert_eq!(body["code"], "xyz");
    assert_eq!(body["redirect_uri"], "loopgate://callback");
    let verifier = body["code_verifier"].as_str().expect("verifier");
    assert_eq!(verifier.len(), 86);
    assert!(verify_pair(verifier, &challenge));
}

/// Validates that a forged redirect burns the attempt.
///
/// Assertions:
/// - Confirms the wrong state yields `InvalidState`.
/// - Confirms the original, correct state then also yields `InvalidState`.
/// - Ensures the token endpoint is never called.
#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_state_then_original_state_both_fail() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens_abc()))
        .expect(0)
        .mount(&h.server)
        .await;

    let authorize_url = h.session.login().expect("login");
    let state = query_param(&authorize_url, "state").expect("state");

    let forged = h.session.handle_callback("loopgate://callback?code=xyz&state=forged").await;
    let original =
        h.session.handle_callback(&format!("loopgate://callback?code=xyz&state={state}")).await;

    assert!(matches!(forged, Err(AuthError::InvalidState)));
    assert!(matches!(original, Err(AuthError::InvalidState)));
    assert!(h.session.get_tokens().is_none());
}

/// Validates single use of a redirect delivered twice.
///
/// Assertions:
/// - Confirms the first delivery succeeds.
/// - Confirms the second delivery yields `InvalidState`.
/// - Ensures exactly one token request was sent.
#[tokio::test(flavor = "multi_thread")]
async fn test_same_redirect_cannot_be_exchanged_twice() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens_abc()))
        .expect(1)
        .mount(&h.server)
        .await;

    let authorize_url = h.session.login().expect("login");
    let state = query_param(&authorize_url, "state").expect("state");
    let redirect = format!("loopgate://callback?code=xyz&state={state}");

    let (first, second) =
        tokio::join!(h.session.handle_callback(&redirect), h.session.handle_callback(&redirect));

    let successes = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let rejected = [&first, &second]
        .iter()
        .filter(|result| matches!(result, Err(AuthError::InvalidState)))
        .count();
    assert_eq!(rejected, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_provider_denial_without_state() {
    let h = harness().await;
    h.session.login().expect("login");

    let err = h
        .session
        .handle_callback("loopgate://callback?error=access_denied&error_description=nope")
        .await
        .expect_err("denied");

    assert!(matches!(err, AuthError::ProviderDenied { ref error, .. } if error == "access_denied"));
    assert!(!h.session.has_pending_login());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_expired_state_is_rejected_before_exchange() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens_abc()))
        .expect(0)
        .mount(&h.server)
        .await;

    let authorize_url = h.session.login().expect("login");
    let state = query_param(&authorize_url, "state").expect("state");
    h.clock.advance_secs(11 * 60);

    let err =
        h.session.handle_callback(&format!("loopgate://callback?code=xyz&state={state}")).await;

    assert!(matches!(err, Err(AuthError::InvalidState)));
}

/// Validates the failed exchange scenario.
///
/// Assertions:
/// - Confirms a 403 with an OAuth error body yields `TokenExchangeFailed`
///   naming the provider error.
/// - Ensures no tokens are stored and the attempt is gone.
#[tokio::test(flavor = "multi_thread")]
async fn test_exchange_rejected_by_provider() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_partial_json(json!({ "code": "stale" })))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid authorization code"
        })))
        .mount(&h.server)
        .await;

    let authorize_url = h.session.login().expect("login");
    let state = query_param(&authorize_url, "state").expect("state");

    let err = h
        .session
        .handle_callback(&format!("loopgate://callback?code=stale&state={state}"))
        .await
        .expect_err("exchange fails");

    match err {
        AuthError::TokenExchangeFailed(detail) => {
            assert!(detail.contains("403"));
            assert!(detail.contains("invalid_grant"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.session.get_tokens().is_none());
    assert!(!h.session.has_pending_login());
}

/// Validates a token response whose lifetime overflows the expiry timestamp.
///
/// Assertions:
/// - Confirms the callback resolves to `TokenExchangeFailed` instead of
///   panicking the task that drives it.
/// - Ensures no tokens are stored and the attempt is gone.
#[tokio::test(flavor = "multi_thread")]
async fn test_out_of_range_expires_in_fails_exchange() {
    let h = harness().await;
    mount_token_success(&h.server, json!({ "access_token": "A", "expires_in": i64::MAX })).await;

    let authorize_url = h.session.login().expect("login");
    let state = query_param(&authorize_url, "state").expect("state");
    let session = Arc::clone(&h.session);

    let result = tokio::spawn(async move {
        session.handle_callback(&format!("loopgate://callback?code=x&state={state}")).await
    })
    .await
    .expect("callback task must not panic");

    assert!(matches!(result, Err(AuthError::TokenExchangeFailed(_))));
    assert!(h.session.get_tokens().is_none());
    assert!(!h.session.has_pending_login());
}

/// Validates that an empty `code` counts as missing.
///
/// Assertions:
/// - Confirms `MissingCode` is returned.
/// - Ensures no token request is sent.
#[tokio::test(flavor = "multi_thread")]
async fn test_empty_code_is_treated_as_missing() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens_abc()))
        .expect(0)
        .mount(&h.server)
        .await;

    let authorize_url = h.session.login().expect("login");
    let state = query_param(&authorize_url, "state").expect("state");

    let err = h.session.handle_callback(&format!("loopgate://callback?code=&state={state}")).await;

    assert!(matches!(err, Err(AuthError::MissingCode)));
    assert!(h.session.get_tokens().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_expires_in_defaults_to_one_hour() {
    let h = harness().await;
    mount_token_success(&h.server, json!({ "access_token": "A", "token_type": "Bearer" })).await;

    let authorize_url = h.session.login().expect("login");
    let state = query_param(&authorize_url, "state").expect("state");

    let tokens = h
        .session
        .handle_callback(&format!("loopgate://callback?code=xyz&state={state}"))
        .await
        .expect("exchange succeeds");

    assert_eq!(tokens.expires_in, 3600);
    assert!(tokens.refresh_token.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_is_authenticated_respects_expiry_grace() {
    let h = harness().await;
    mount_token_success(&h.server, tokens_abc()).await;

    let authorize_url = h.session.login().expect("login");
    let state = query_param(&authorize_url, "state").expect("state");
    h.session
        .handle_callback(&format!("loopgate://callback?code=xyz&state={state}"))
        .await
        .expect("exchange succeeds");

    assert!(h.session.is_authenticated());
    h.clock.advance_secs(3600 - 30);
    assert!(!h.session.is_authenticated());
    assert!(h.session.get_tokens().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_loopback_redirect_uri_is_sent_in_exchange() {
    let h = harness().await;
    mount_token_success(&h.server, tokens_abc()).await;
    h.session.set_callback_port(Some(52847));

    let authorize_url = h.session.login().expect("login");
    let state = query_param(&authorize_url, "state").expect("state");
    // Port cleared after login: the exchange still uses the redirect that
    // was sent in the authorize request.
    h.session.set_callback_port(None);

    h.session
        .handle_callback(&format!("http://127.0.0.1:52847/callback?code=xyz&state={state}"))
        .await
        .expect("exchange succeeds");

    let requests = h.server.received_requests().await.expect("request recording");
    let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");
    assert_eq!(body["redirect_uri"], "http://127.0.0.1:52847/callback");
}
