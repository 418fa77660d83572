//! Application constants
//!
//! Centralized location for protocol, transport and timing constants used
//! throughout the workspace.

// Authorization flow
pub const STATE_TIMEOUT_SECS: i64 = 10 * 60;
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
pub const TOKEN_EXPIRY_GRACE_SECS: i64 = 60;
pub const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email", "offline_access"];

// Custom URI schemes
pub const DEFAULT_AUTH_SCHEME: &str = "loopgate";
pub const DEFAULT_APP_SCHEME: &str = "loopgate-app";
pub const CALLBACK_HOST: &str = "callback";

// Loopback transport. The port is fixed because the identity provider
// rejects dynamically assigned loopback ports.
pub const DEFAULT_CALLBACK_PORT: u16 = 52847;
pub const CALLBACK_PATH: &str = "/callback";
pub const CALLBACK_SHUTDOWN_GRACE_MS: u64 = 3000;

// Packaged resources
pub const INDEX_DOCUMENT: &str = "index.html";

// Single-instance coordination
pub const LOCK_FILE_NAME: &str = "loopgate.lock";
