//! Redaction policy for authorization logging
//!
//! Secrets never reach a log line verbatim unless the process runs as a
//! development build with authorization debugging switched on. Otherwise
//! events carry a short [`fingerprint`] that lets two log lines be correlated
//! without revealing the value.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest
const FINGERPRINT_LEN: usize = 8;

/// Stable, non-reversible identifier for a secret value
///
/// First 8 hex characters of SHA-256. Safe to log in every build.
#[must_use]
pub fn fingerprint(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(FINGERPRINT_LEN);
    encoded
}

/// What authorization logging may include
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensitiveLogging {
    verbose: bool,
    reveal_secrets: bool,
}

impl SensitiveLogging {
    /// Build the policy from the two configuration switches.
    ///
    /// Verbose events are emitted when either switch is on; secrets are only
    /// revealed when both are.
    #[must_use]
    pub const fn new(auth_debug: bool, development: bool) -> Self {
        Self { verbose: auth_debug || development, reveal_secrets: auth_debug && development }
    }

    /// Policy that logs nothing beyond the lifecycle events
    #[must_use]
    pub const fn quiet() -> Self {
        Self { verbose: false, reveal_secrets: false }
    }

    /// Whether step-by-step debug events should be emitted
    #[must_use]
    pub const fn is_verbose(&self) -> bool {
        self.verbose
    }

    #[must_use]
    pub const fn reveals_secrets(&self) -> bool {
        self.reveal_secrets
    }

    /// Render a secret for a log field.
    ///
    /// Returns the raw value only when secrets may be revealed, otherwise
    /// `fp:<fingerprint>`.
    #[must_use]
    pub fn render(&self, secret: &str) -> String {
        if self.reveal_secrets {
            secret.to_string()
        } else {
            format!("fp:{}", fingerprint(secret))
        }
    }
}
