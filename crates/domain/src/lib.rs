//! # Loopgate Domain
//!
//! Domain types shared by every Loopgate crate.
//!
//! This crate contains:
//! - The workspace error type and `Result` alias
//! - Configuration structures (auth provider, transports, resources)
//! - Protocol and timing constants
//!
//! ## Architecture
//! - No dependencies on other Loopgate crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
