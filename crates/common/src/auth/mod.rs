//! OAuth 2.0 Authorization Code + PKCE for desktop applications
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ AuthorizationSession │  login / handle_callback / get_tokens
//! └──────────┬───────────┘
//!            │
//!            ├──► PKCE utilities   (verifier, challenge, state)
//!            ├──► BrowserLauncher  (opens the authorize URL)
//!            ├──► Clock            (state timeout, token expiry)
//!            └──► reqwest::Client  (token endpoint)
//! ```
//!
//! Transports (custom URI scheme, loopback HTTP server, second-instance
//! replay) live in `loopgate-infra` and reach the session only through
//! [`CallbackHandler`].
//!
//! # Security Features
//!
//! - **PKCE (S256)**: the verifier leaves the process only in the token
//!   request
//! - **State Validation**: 256-bit state, constant-time comparison, ten
//!   minute lifetime, single use
//! - **No Client Secrets**: public client
//! - **Memory-only tokens**: zeroed on drop, redacted from `Debug`

pub mod error;
pub mod pkce;
pub mod session;
pub mod traits;
pub mod types;

pub use error::AuthError;
pub use pkce::{derive_challenge, generate_pair, generate_state, verify_pair, PkceError, PkcePair};
pub use session::{AuthorizationSession, PendingAuthorization};
pub use traits::{BrowserLauncher, CallbackHandler, WindowController};
pub use types::{AuthorizationPhase, OAuthConfig, OAuthErrorResponse, TokenResponse, TokenSet};
