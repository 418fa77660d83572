//! Security primitives for handling authorization secrets
//!
//! Secrets (PKCE verifiers, state tokens, OAuth tokens) are wrapped in
//! [`SecretString`] so they are zeroed on drop and never printed by `Debug`.

pub mod secret;

pub use secret::{constant_time_eq, SecretString};
