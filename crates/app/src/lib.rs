//! # Loopgate App
//!
//! Application layer - context wiring and the headless shell.
//!
//! This crate contains:
//! - Application context (session, transports, instance guard)
//! - Headless host bindings
//!
//! ## Architecture
//! - Depends on `domain`, `common` and `infra`
//! - Owns startup ordering: schemes, readiness, listeners

pub mod context;
pub mod host;

pub use context::{AppContext, HostBindings};
pub use host::{AuthDisabled, ConsoleWindow, UnbundledRegistrar};
