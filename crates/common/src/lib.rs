//! Authorization core shared across Loopgate crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: secrets, clocks
//! - `observability`: redaction helpers for `tracing` events
//! - `runtime`: async infrastructure
//! - `platform`: the OAuth session and its host traits (default)
//! - `test-utils`: mocks for the host traits

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod security;
#[cfg(feature = "foundation")]
pub mod time;

// Observability tier
// --------------------------------------------------------------
#[cfg(feature = "observability")]
pub mod observability;

// Platform tier
// -------------------------------------------------------------------
#[cfg(feature = "platform")]
pub mod auth;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "platform", feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "platform")]
pub use auth::{
    AuthError, AuthorizationSession, BrowserLauncher, CallbackHandler, OAuthConfig, TokenSet,
    WindowController,
};
#[cfg(feature = "observability")]
pub use observability::{fingerprint, SensitiveLogging};
#[cfg(feature = "foundation")]
pub use security::SecretString;
#[cfg(feature = "foundation")]
pub use time::{Clock, MockClock, SystemClock};
