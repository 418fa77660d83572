//! Testing utilities and helpers
//!
//! - **[`mocks`]**: recording implementations of the host traits
//!   (`BrowserLauncher`, `WindowController`, `CallbackHandler`)
//! - [`MockClock`] re-exported from [`crate::time`]
//! - [`query_param`] for pulling values out of authorize and redirect URLs
//!
//! ## Usage
//!
//! ```rust
//! # #[cfg(feature = "platform")]
//! # {
//! use std::sync::Arc;
//!
//! use loopgate_common::auth::{AuthorizationSession, OAuthConfig};
//! use loopgate_common::testing::{query_param, MockBrowser};
//!
//! let browser = MockBrowser::new();
//! let config = OAuthConfig::new(
//!     "dev-test.us.auth0.com".to_string(),
//!     "client".to_string(),
//!     "loopgate://callback".to_string(),
//!     vec!["openid".to_string()],
//!     None,
//! );
//! let session = AuthorizationSession::new(config, Arc::new(browser.clone()));
//!
//! let url = session.login().unwrap();
//! assert_eq!(browser.opened(), vec![url.clone()]);
//! assert!(query_param(&url, "state").is_some());
//! # }
//! ```

pub mod mocks;

use url::Url;

pub use crate::time::MockClock;
pub use mocks::{MockBrowser, MockCallbackHandler, MockWindow, WindowCall};

/// First value of query parameter `name` in `url`, percent-decoded
#[must_use]
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
}
