//! # Loopgate Infrastructure
//!
//! Host-facing pieces of the desktop authorization flow.
//!
//! This crate contains:
//! - Redirect transports (custom scheme listener, loopback HTTP server)
//! - The app-scheme resource handler
//! - Single-instance coordination
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Drives `loopgate-common`'s `AuthorizationSession` through the
//!   `CallbackHandler` trait
//! - Contains all "impure" code (sockets, files, OS integration)

pub mod callback;
pub mod config;
pub mod instance;
pub mod observability;
pub mod platform;
pub mod resources;

// Re-export commonly used items
pub use callback::{
    CallbackServerConfig, LoopbackCallbackServer, ProtocolClientRegistrar, SchemeCallbackListener,
    SchemePrivileges, SchemeRegistry,
};
pub use instance::{InstanceRole, PrimaryInstance, SingleInstanceCoordinator};
pub use observability::{init_tracing, LogSettings};
pub use platform::{select_transports, Platform, SystemBrowser, TransportPlan};
pub use resources::{ResourceError, ResourceRoot, ResourceSchemeHandler};
