//! Custom URI scheme transport
//!
//! The host declares privileged schemes before it is ready (a
//! [`SchemeRegistry`] rejects late declarations), registers the process as
//! the OS handler for the auth scheme, and feeds OS "open URL" events into
//! an mpsc channel. [`SchemeCallbackListener`] drains that channel and
//! forwards `<scheme>://callback?...` URLs to the session.

use std::sync::Arc;

use loopgate_common::auth::{CallbackHandler, WindowController};
use loopgate_domain::constants::CALLBACK_HOST;
use loopgate_domain::{LoopgateError, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::platform::Platform;

/// Capabilities granted to a custom scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemePrivileges {
    /// Parsed like `http` (host, path, relative resolution)
    pub standard: bool,
    /// Treated as a secure origin
    pub secure: bool,
    /// Usable from `fetch`
    pub supports_fetch: bool,
    pub cors_enabled: bool,
}

impl SchemePrivileges {
    /// Redirect-only scheme: never fetched by page content
    pub const AUTH_CALLBACK: Self =
        Self { standard: true, secure: true, supports_fetch: false, cors_enabled: false };

    /// Scheme serving packaged application resources
    pub const APP_RESOURCES: Self =
        Self { standard: true, secure: true, supports_fetch: true, cors_enabled: true };
}

/// A declared scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeRegistration {
    pub scheme: String,
    pub privileges: SchemePrivileges,
}

#[derive(Debug, Default)]
struct RegistryState {
    registrations: Vec<SchemeRegistration>,
    ready: bool,
}

/// Privileged scheme declarations, closed once the host is ready
#[derive(Debug, Default)]
pub struct SchemeRegistry {
    state: Mutex<RegistryState>,
}

impl SchemeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `scheme` with `privileges`.
    ///
    /// # Errors
    /// Returns `LoopgateError::Platform` if the host is already ready or the
    /// scheme was declared before.
    pub fn register(&self, scheme: &str, privileges: SchemePrivileges) -> Result<()> {
        let mut state = self.state.lock();
        if state.ready {
            return Err(LoopgateError::Platform(format!(
                "scheme {scheme:?} must be registered before the application is ready"
            )));
        }
        if state.registrations.iter().any(|r| r.scheme.eq_ignore_ascii_case(scheme)) {
            return Err(LoopgateError::Platform(format!("scheme {scheme:?} already registered")));
        }

        state.registrations.push(SchemeRegistration { scheme: scheme.to_string(), privileges });
        drop(state);

        debug!(event = "scheme.registered", scheme, ?privileges, "Scheme declared");
        Ok(())
    }

    /// Close the registry; later `register` calls fail.
    pub fn mark_ready(&self) {
        self.state.lock().ready = true;
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    #[must_use]
    pub fn privileges(&self, scheme: &str) -> Option<SchemePrivileges> {
        self.state
            .lock()
            .registrations
            .iter()
            .find(|r| r.scheme.eq_ignore_ascii_case(scheme))
            .map(|r| r.privileges)
    }

    #[must_use]
    pub fn registrations(&self) -> Vec<SchemeRegistration> {
        self.state.lock().registrations.clone()
    }
}

/// OS registration of the process as a scheme's default handler
pub trait ProtocolClientRegistrar: Send + Sync {
    /// Make this process the default handler for `scheme`
    ///
    /// # Errors
    /// Returns a description of the failure
    fn set_as_default_protocol_client(&self, scheme: &str) -> std::result::Result<(), String>;
}

/// Forwards `<scheme>://callback` URLs from OS open-URL events
#[derive(Clone)]
pub struct SchemeCallbackListener {
    scheme: String,
    handler: Arc<dyn CallbackHandler>,
    window: Option<Arc<dyn WindowController>>,
}

impl std::fmt::Debug for SchemeCallbackListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeCallbackListener").field("scheme", &self.scheme).finish_non_exhaustive()
    }
}

impl SchemeCallbackListener {
    #[must_use]
    pub fn new(scheme: impl Into<String>, handler: Arc<dyn CallbackHandler>) -> Self {
        Self { scheme: scheme.into(), handler, window: None }
    }

    /// Bring this window forward and reload it after a successful login
    #[must_use]
    pub fn with_window(mut self, window: Arc<dyn WindowController>) -> Self {
        self.window = Some(window);
        self
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Declare the auth scheme: standard and secure, no fetch, no CORS.
    ///
    /// # Errors
    /// Returns `LoopgateError::Platform` if the registry is already closed.
    pub fn register_scheme(&self, registry: &SchemeRegistry) -> Result<()> {
        registry.register(&self.scheme, SchemePrivileges::AUTH_CALLBACK)
    }

    /// Whether `url` is an authorization redirect for this scheme
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|parsed| {
            parsed.scheme().eq_ignore_ascii_case(&self.scheme)
                && parsed.host_str() == Some(CALLBACK_HOST)
        })
    }

    /// Register as protocol client and start draining `url_events`.
    ///
    /// Must run after the host is ready. On macOS the process is made the
    /// default handler for the scheme; a failure there is logged and the
    /// listener still starts.
    ///
    /// # Errors
    /// Returns `LoopgateError::Platform` if the registry is not ready yet.
    pub fn setup(
        self,
        platform: Platform,
        registry: &SchemeRegistry,
        registrar: &dyn ProtocolClientRegistrar,
        mut url_events: mpsc::Receiver<String>,
    ) -> Result<JoinHandle<()>> {
        if !registry.is_ready() {
            return Err(LoopgateError::Platform(
                "scheme listener must be set up after the application is ready".to_string(),
            ));
        }

        if platform.delivers_scheme_redirects() {
            match registrar.set_as_default_protocol_client(&self.scheme) {
                Ok(()) => info!(
                    event = "scheme.protocol_client_registered",
                    scheme = %self.scheme,
                    "Registered as default protocol client"
                ),
                Err(error) => warn!(
                    event = "scheme.protocol_client_failed",
                    scheme = %self.scheme,
                    %error,
                    "Could not register as default protocol client"
                ),
            }
        }

        Ok(tokio::spawn(async move {
            while let Some(url) = url_events.recv().await {
                self.dispatch(&url).await;
            }
            debug!(event = "scheme.listener_stopped", "Open-URL channel closed");
        }))
    }

    /// Handle one open-URL event. Returns whether a login completed.
    pub async fn dispatch(&self, url: &str) -> bool {
        if !self.matches(url) {
            debug!(event = "scheme.url_ignored", "Open-URL event is not an auth redirect");
            return false;
        }

        match self.handler.handle_callback(url).await {
            Ok(_) => {
                info!(event = "scheme.callback_completed", "Login completed via custom scheme");
                if let Some(window) = &self.window {
                    window.bring_to_front();
                    window.reload();
                }
                true
            }
            Err(err) => {
                warn!(
                    event = "scheme.callback_failed",
                    reason = err.label(),
                    error = %err,
                    "Custom scheme redirect rejected"
                );
                false
            }
        }
    }
}
