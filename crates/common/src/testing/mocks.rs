//! Mock implementations of the host traits
//!
//! Each mock is cheap to clone; clones share their recordings so a test can
//! hand one clone to the code under test and inspect the other.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::auth::{
    AuthError, BrowserLauncher, CallbackHandler, TokenResponse, TokenSet, WindowController,
};

/// Browser that records the URLs it was asked to open
#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    opened: Arc<Mutex<Vec<String>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `open` fail with `reason`
    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock() = Some(reason.to_string());
    }

    /// URLs opened so far, oldest first
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    pub fn last_opened(&self) -> Option<String> {
        self.opened.lock().last().cloned()
    }
}

impl BrowserLauncher for MockBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(reason);
        }
        self.opened.lock().push(url.to_string());
        Ok(())
    }
}

/// Window operation recorded by [`MockWindow`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCall {
    Restore,
    Focus,
    Reload,
}

/// Window controller that records every call
#[derive(Debug, Clone, Default)]
pub struct MockWindow {
    calls: Arc<Mutex<Vec<WindowCall>>>,
}

impl MockWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<WindowCall> {
        self.calls.lock().clone()
    }
}

impl WindowController for MockWindow {
    fn restore(&self) {
        self.calls.lock().push(WindowCall::Restore);
    }

    fn focus(&self) {
        self.calls.lock().push(WindowCall::Focus);
    }

    fn reload(&self) {
        self.calls.lock().push(WindowCall::Reload);
    }
}

/// Callback handler that records redirects instead of exchanging codes
///
/// Succeeds with a fixed token set (`access_token = "mock-access"`) unless
/// built with [`MockCallbackHandler::failing`], in which case every call
/// returns `AuthError::InvalidState`.
#[derive(Debug, Clone, Default)]
pub struct MockCallbackHandler {
    received: Arc<Mutex<Vec<String>>>,
    ports: Arc<Mutex<Vec<Option<u16>>>>,
    fail: bool,
}

impl MockCallbackHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// Redirect URLs received so far, oldest first
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Every value passed to `register_callback_port`, oldest first
    pub fn registered_ports(&self) -> Vec<Option<u16>> {
        self.ports.lock().clone()
    }
}

#[async_trait]
impl CallbackHandler for MockCallbackHandler {
    async fn handle_callback(&self, redirect_url: &str) -> Result<TokenSet, AuthError> {
        self.received.lock().push(redirect_url.to_string());
        if self.fail {
            return Err(AuthError::InvalidState);
        }

        let response = TokenResponse {
            access_token: "mock-access".to_string(),
            refresh_token: None,
            id_token: None,
            token_type: Some("Bearer".to_string()),
            expires_in: Some(3600),
            scope: None,
        };
        TokenSet::from_response(response, Utc::now())
    }

    fn register_callback_port(&self, port: Option<u16>) {
        self.ports.lock().push(port);
    }
}
