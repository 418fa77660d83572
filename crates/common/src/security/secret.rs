//! Secret string type with automatic memory zeroization

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// String holding a secret value
///
/// The backing memory is zeroed when the value is dropped, and `Debug` /
/// `Display` never reveal the contents. Use [`SecretString::expose`] at the
/// single point where the raw value has to leave the process (an HTTP body,
/// a query parameter).
///
/// There is deliberately no `PartialEq`: compare with
/// [`SecretString::constant_time_eq`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString {
    inner: String,
}

impl SecretString {
    /// Wrap a secret value
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self { inner: s.into() }
    }

    /// Expose the secret value
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// Length of the secret in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Compare against an untrusted value without leaking the position of
    /// the first differing byte through timing.
    #[must_use]
    pub fn constant_time_eq(&self, other: &str) -> bool {
        constant_time_eq(self.inner.as_bytes(), other.as_bytes())
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString(***)")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

/// Constant-time comparison to prevent timing attacks
///
/// Length mismatches return early; only the contents are compared in
/// constant time.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}
