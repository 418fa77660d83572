//! Observability helpers shared by every crate
//!
//! Subscriber installation lives in `loopgate-infra`; this module only holds
//! the pieces that decide what an event is allowed to contain.

pub mod redact;

pub use redact::{fingerprint, SensitiveLogging};
