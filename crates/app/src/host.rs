//! Headless host bindings
//!
//! The command-line shell has no window and no application bundle; these
//! implementations log what a desktop shell would do instead.

use loopgate_common::auth::{AuthError, CallbackHandler, TokenSet, WindowController};
use loopgate_infra::callback::ProtocolClientRegistrar;
use tracing::{info, warn};

/// Window stand-in that records requests in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleWindow;

impl WindowController for ConsoleWindow {
    fn restore(&self) {
        info!(event = "window.restore", "Primary window restore requested");
    }

    fn focus(&self) {
        info!(event = "window.focus", "Primary window focus requested");
    }

    fn reload(&self) {
        info!(event = "window.reload", "Primary window reload requested");
    }
}

/// Registrar for unbundled builds
///
/// LaunchServices only routes a scheme to a bundled application, so the
/// request is refused and logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnbundledRegistrar;

impl ProtocolClientRegistrar for UnbundledRegistrar {
    fn set_as_default_protocol_client(&self, scheme: &str) -> Result<(), String> {
        Err(format!("cannot register {scheme}:// without an application bundle"))
    }
}

/// Callback sink used when authentication is disabled
///
/// There is never a pending login, so every redirect is rejected the same
/// way an unsolicited one would be.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthDisabled;

#[async_trait::async_trait]
impl CallbackHandler for AuthDisabled {
    async fn handle_callback(&self, _redirect_url: &str) -> Result<TokenSet, AuthError> {
        warn!(event = "auth.disabled_redirect", "Redirect received while authentication is disabled");
        Err(AuthError::InvalidState)
    }
}
