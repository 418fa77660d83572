//! Structured logging initialization
//!
//! Installs a `tracing-subscriber` fmt subscriber. `RUST_LOG` always wins;
//! otherwise the level follows the authorization debug switches so that
//! `LOOPGATE_AUTH_DEBUG` alone is enough to see the step-by-step events.

use loopgate_domain::{LoggingSettings, LoopgateError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Subscriber options
#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    /// Emit newline-delimited JSON instead of human-readable lines
    pub json: bool,
    /// Default to `debug` for Loopgate crates when `RUST_LOG` is unset
    pub verbose: bool,
}

impl LogSettings {
    #[must_use]
    pub fn from_config(logging: &LoggingSettings) -> Self {
        Self { json: logging.json, verbose: logging.auth_debug || logging.development }
    }

    fn default_directive(&self) -> &'static str {
        if self.verbose {
            "info,loopgate_common=debug,loopgate_infra=debug,loopgate_app=debug"
        } else {
            "info"
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
/// Returns `LoopgateError::Internal` if a global subscriber is already set.
pub fn init_tracing(settings: &LogSettings) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.default_directive()));

    let result = if settings.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_filter(env_filter);
        tracing_subscriber::registry().with(fmt_layer).try_init()
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_filter(env_filter);
        tracing_subscriber::registry().with(fmt_layer).try_init()
    };

    result.map_err(|e| LoopgateError::Internal(format!("failed to install tracing subscriber: {e}")))
}
