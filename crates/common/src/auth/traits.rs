//! Traits at the seams between the authorization core and its host
//!
//! The session, the callback transports and the single-instance coordinator
//! only talk to the browser, the primary window and each other through these
//! traits, so every host (and every test) can provide its own.

use async_trait::async_trait;

use super::error::AuthError;
use super::types::TokenSet;

/// Receiver of raw authorization redirect URLs
///
/// Implemented by `AuthorizationSession` and shared by every transport that
/// can deliver a redirect (custom scheme, loopback server, second-instance
/// replay).
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    /// Validate the redirect and complete the code exchange
    ///
    /// # Arguments
    /// * `redirect_url` - The full redirect URL, query string included
    ///
    /// # Errors
    /// Returns the `AuthError` describing why the redirect was rejected or
    /// why the exchange failed
    async fn handle_callback(&self, redirect_url: &str) -> Result<TokenSet, AuthError>;

    /// Announce the loopback port redirects should target, or `None` once
    /// the listener has stopped
    fn register_callback_port(&self, _port: Option<u16>) {}
}

/// Opens URLs in the user's browser
pub trait BrowserLauncher: Send + Sync {
    /// Open `url` in the system browser
    ///
    /// # Errors
    /// Returns a description of the failure if the browser could not be
    /// launched
    fn open(&self, url: &str) -> Result<(), String>;
}

/// Operations on the application's primary window
pub trait WindowController: Send + Sync {
    /// Un-minimize and show the window
    fn restore(&self);

    /// Give the window keyboard focus
    fn focus(&self);

    /// Reload the window contents so they pick up the new session
    fn reload(&self);

    /// Restore and focus in one step
    fn bring_to_front(&self) {
        self.restore();
        self.focus();
    }
}
