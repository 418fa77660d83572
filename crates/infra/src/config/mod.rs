//! Configuration loading
//!
//! Builds an [`AppConfig`](loopgate_domain::AppConfig) from environment
//! variables and, for anything the environment leaves unset, a config file.

pub mod loader;

// Re-export commonly used items
pub use loader::{
    apply_env, load, load_from_env, load_from_file, load_with_source, probe_config_paths,
};
