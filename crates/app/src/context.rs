//! Application context - wires the session to its transports

use std::sync::Arc;

use loopgate_common::auth::{
    AuthorizationSession, BrowserLauncher, CallbackHandler, OAuthConfig, WindowController,
};
use loopgate_common::SensitiveLogging;
use loopgate_domain::{AppConfig, LoopgateError, Result};
use loopgate_infra::callback::{
    CallbackServerConfig, LoopbackCallbackServer, ProtocolClientRegistrar, SchemeCallbackListener,
    SchemeRegistry,
};
use loopgate_infra::instance::PrimaryInstance;
use loopgate_infra::platform::{select_transports, Platform, TransportPlan};
use loopgate_infra::resources::{ResourceRoot, ResourceSchemeHandler};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::host::AuthDisabled;

const OPEN_URL_BUFFER: usize = 16;

/// Host-provided integrations
#[derive(Clone)]
pub struct HostBindings {
    pub window: Arc<dyn WindowController>,
    pub registrar: Arc<dyn ProtocolClientRegistrar>,
    pub browser: Arc<dyn BrowserLauncher>,
}

/// Running application: session, transports and the instance guard
pub struct AppContext {
    pub config: AppConfig,
    pub platform: Platform,
    pub transports: TransportPlan,
    pub session: Option<Arc<AuthorizationSession>>,
    pub loopback: Option<LoopbackCallbackServer>,
    pub resources: Option<ResourceSchemeHandler>,
    pub registry: Arc<SchemeRegistry>,
    open_url_tx: mpsc::Sender<String>,
    scheme_task: Option<JoinHandle<()>>,

    // Keep the single-instance lock for the lifetime of the app
    _instance: PrimaryInstance,
}

impl AppContext {
    /// Build the session and start every transport `config` enables.
    ///
    /// Schemes are declared first, then the registry is closed, then the
    /// listeners start.
    ///
    /// # Errors
    /// Returns an error if the resource root is unusable, a scheme cannot be
    /// declared, or the loopback port cannot be bound.
    pub async fn start(
        config: AppConfig,
        platform: Platform,
        mut instance: PrimaryInstance,
        host: HostBindings,
    ) -> Result<Self> {
        let registry = Arc::new(SchemeRegistry::new());
        let transports = select_transports(platform, &config.transport);

        let session = if config.auth.enabled {
            let logging =
                SensitiveLogging::new(config.logging.auth_debug, config.logging.development);
            let session = AuthorizationSession::new(
                OAuthConfig::from_app_config(&config),
                Arc::clone(&host.browser),
            )
            .with_logging(logging);
            Some(Arc::new(session))
        } else {
            info!(event = "auth.disabled", "Authentication disabled; starting without login support");
            None
        };

        let handler: Arc<dyn CallbackHandler> = match &session {
            Some(session) => session.clone(),
            None => Arc::new(AuthDisabled),
        };

        let resources = match &config.resources.root {
            Some(root) => {
                let handler = ResourceSchemeHandler::new(
                    config.resources.app_scheme.clone(),
                    ResourceRoot::new(root)?,
                    config.resources.index_document.clone(),
                );
                handler.register(&registry)?;
                Some(handler)
            }
            None => None,
        };

        let listener = if session.is_some() && transports.scheme_listener {
            let listener =
                SchemeCallbackListener::new(config.transport.auth_scheme.clone(), handler.clone())
                    .with_window(Arc::clone(&host.window));
            listener.register_scheme(&registry)?;
            Some(listener)
        } else {
            None
        };

        registry.mark_ready();

        let (open_url_tx, open_url_rx) = mpsc::channel(OPEN_URL_BUFFER);
        let scheme_task = match listener {
            Some(listener) => {
                Some(listener.setup(platform, &registry, host.registrar.as_ref(), open_url_rx)?)
            }
            None => None,
        };

        let loopback = if session.is_some() && transports.loopback_server {
            let server = LoopbackCallbackServer::new(
                CallbackServerConfig::with_port(config.transport.callback_port),
                handler.clone(),
            )
            .with_window(Arc::clone(&host.window));
            server.start().await?;
            Some(server)
        } else {
            None
        };

        instance.serve(handler, Arc::clone(&host.window));

        info!(
            event = "app.started",
            ?platform,
            auth_enabled = session.is_some(),
            scheme_listener = scheme_task.is_some(),
            loopback_server = loopback.is_some(),
            resources = resources.is_some(),
            "Loopgate started"
        );

        Ok(Self {
            config,
            platform,
            transports,
            session,
            loopback,
            resources,
            registry,
            open_url_tx,
            scheme_task,
            _instance: instance,
        })
    }

    /// Sender for OS open-URL events
    #[must_use]
    pub fn open_url_sender(&self) -> mpsc::Sender<String> {
        self.open_url_tx.clone()
    }

    /// Start a login in the system browser. Returns the authorize URL.
    ///
    /// The loopback server stops after each completed login, so it is
    /// restarted here first; the redirect then targets its port again.
    ///
    /// # Errors
    /// Returns `LoopgateError::Config` when authentication is disabled,
    /// `LoopgateError::Network` when the loopback port cannot be bound, and
    /// the session's error otherwise.
    pub async fn login(&self) -> Result<String> {
        let session = self.session.as_ref().ok_or_else(|| {
            LoopgateError::Config("authentication is disabled".to_string())
        })?;
        if let Some(server) = &self.loopback {
            server.start().await?;
        }
        Ok(session.login()?)
    }

    /// Stop the listeners; the instance lock is released on drop.
    pub async fn shutdown(mut self) {
        if let Some(server) = self.loopback.take() {
            server.stop().await;
        }
        if let Some(task) = self.scheme_task.take() {
            task.abort();
        }
        info!(event = "app.stopped", "Loopgate stopped");
    }
}

#[cfg(test)]
mod tests {
    use loopgate_common::testing::{query_param, MockBrowser, MockWindow};
    use loopgate_infra::instance::{InstanceRole, SingleInstanceCoordinator};

    use super::*;
    use crate::host::UnbundledRegistrar;

    async fn primary(dir: &tempfile::TempDir) -> PrimaryInstance {
        let coordinator = SingleInstanceCoordinator::new(dir.path(), "loopgate");
        match coordinator.acquire(&[]).await.unwrap() {
            InstanceRole::Primary(primary) => primary,
            InstanceRole::Secondary => panic!("fresh lock dir must yield primary"),
        }
    }

    fn host(browser: &MockBrowser) -> HostBindings {
        HostBindings {
            window: Arc::new(MockWindow::new()),
            registrar: Arc::new(UnbundledRegistrar),
            browser: Arc::new(browser.clone()),
        }
    }

    fn enabled_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.enabled = true;
        config.auth.domain = "dev-test.us.auth0.com".to_string();
        config.auth.client_id = "client123".to_string();
        config.transport.callback_port = 0;
        config
    }

    #[tokio::test]
    async fn test_disabled_auth_starts_without_transports() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();

        let context =
            AppContext::start(AppConfig::default(), Platform::Linux, primary(&dir).await, host(&browser))
                .await
                .unwrap();

        assert!(context.session.is_none());
        assert!(context.loopback.is_none());
        assert!(context.registry.is_ready());
        assert!(matches!(context.login().await, Err(LoopgateError::Config(_))));
        context.shutdown().await;
    }

    /// Validates `AppContext::start` for the loopback-only platform scenario.
    ///
    /// Assertions:
    /// - Ensures the loopback server runs and its port reaches the session.
    /// - Ensures login opens an authorize URL with the loopback redirect.
    /// - Ensures shutdown clears the session's callback port.
    #[tokio::test]
    async fn test_enabled_auth_uses_loopback_on_linux() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();

        let context =
            AppContext::start(enabled_config(), Platform::Linux, primary(&dir).await, host(&browser))
                .await
                .unwrap();

        assert!(!context.transports.scheme_listener);
        let server = context.loopback.clone().unwrap();
        let port = server.port().await.unwrap();
        let session = context.session.clone().unwrap();
        assert_eq!(session.callback_port(), Some(port));

        let url = context.login().await.unwrap();
        assert_eq!(browser.last_opened(), Some(url.clone()));
        assert_eq!(
            query_param(&url, "redirect_uri"),
            Some(format!("http://127.0.0.1:{port}/callback"))
        );

        context.shutdown().await;
        assert_eq!(session.callback_port(), None);
    }

    /// Validates `AppContext::login` after the loopback server has stopped.
    ///
    /// Assertions:
    /// - Ensures login brings the loopback server back up.
    /// - Ensures the redirect targets the loopback origin, not the scheme.
    #[tokio::test]
    async fn test_login_after_stop_restarts_loopback() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();

        let context =
            AppContext::start(enabled_config(), Platform::Linux, primary(&dir).await, host(&browser))
                .await
                .unwrap();
        let server = context.loopback.clone().unwrap();
        server.stop().await;
        assert!(!server.is_running().await);

        let url = context.login().await.unwrap();

        assert!(server.is_running().await);
        let port = server.port().await.unwrap();
        assert_eq!(
            query_param(&url, "redirect_uri"),
            Some(format!("http://127.0.0.1:{port}/callback"))
        );
        context.shutdown().await;
    }

    #[tokio::test]
    async fn test_macos_declares_both_schemes() {
        let dir = tempfile::tempdir().unwrap();
        let resources = tempfile::tempdir().unwrap();
        let mut config = enabled_config();
        config.transport.loopback_enabled = false;
        config.resources.root = Some(resources.path().display().to_string());

        let context =
            AppContext::start(config, Platform::MacOs, primary(&dir).await, host(&MockBrowser::new()))
                .await
                .unwrap();

        let schemes: Vec<String> =
            context.registry.registrations().into_iter().map(|r| r.scheme).collect();
        assert_eq!(schemes, vec!["loopgate-app".to_string(), "loopgate".to_string()]);
        assert!(context.resources.is_some());
        assert!(context.loopback.is_none());
        assert!(!context.open_url_sender().is_closed());
        context.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_resource_root_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.resources.root = Some(dir.path().join("absent").display().to_string());

        let result =
            AppContext::start(config, Platform::Linux, primary(&dir).await, host(&MockBrowser::new()))
                .await;

        assert!(matches!(result, Err(LoopgateError::Config(_))));
    }
}
