//! Platform detection and host integrations
//!
//! Decides which redirect transports run on the current OS and provides the
//! system browser launcher.

use loopgate_common::auth::BrowserLauncher;
use loopgate_domain::TransportSettings;
use tracing::info;

/// Desktop operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
    Other,
}

impl Platform {
    /// Platform this binary was built for
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }

    /// Whether custom-scheme redirects are delivered to the running process
    ///
    /// Only macOS hands `open-url` events to the application; elsewhere a
    /// scheme redirect launches a second process, which the single-instance
    /// coordinator forwards.
    #[must_use]
    pub const fn delivers_scheme_redirects(self) -> bool {
        matches!(self, Self::MacOs)
    }
}

/// Transports to start for this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportPlan {
    pub scheme_listener: bool,
    pub loopback_server: bool,
}

impl TransportPlan {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.scheme_listener && !self.loopback_server
    }
}

/// Pick the redirect transports for `platform` under `settings`.
#[must_use]
pub fn select_transports(platform: Platform, settings: &TransportSettings) -> TransportPlan {
    let plan = TransportPlan {
        scheme_listener: settings.scheme_enabled && platform.delivers_scheme_redirects(),
        loopback_server: settings.loopback_enabled,
    };

    if plan.is_empty() {
        info!(
            event = "platform.no_callback_transport",
            ?platform,
            "No redirect transport enabled; only second-instance replay can complete a login"
        );
    }

    plan
}

/// Opens URLs with the operating system's default browser
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        open::that(url).map_err(|e| e.to_string())
    }
}
