//! Loopback HTTP transport for authorization redirects
//!
//! Listens on `127.0.0.1:<port>/callback` so platforms without custom scheme
//! delivery can still complete a login. The redirect is rebuilt as
//! `http://127.0.0.1:<port>/callback?<query>` and handed to the shared
//! [`CallbackHandler`].

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::extract::{Query, RawQuery, State};
use axum::http::{StatusCode, Uri};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use loopgate_common::auth::{CallbackHandler, WindowController};
use loopgate_domain::constants::{CALLBACK_PATH, CALLBACK_SHUTDOWN_GRACE_MS, DEFAULT_CALLBACK_PORT};
use loopgate_domain::{LoopgateError, Result};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Signed in</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 4em;">
<h2>You are signed in</h2>
<p>You can close this window and return to the application.</p>
<script>setTimeout(function () { window.close(); }, 2000);</script>
</body>
</html>"#;

const FAILURE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Sign-in failed</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 4em;">
<h2>Sign-in failed</h2>
<p>Return to the application and try again.</p>
</body>
</html>"#;

/// Loopback server settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackServerConfig {
    /// Fixed port registered with the provider. `0` picks an ephemeral port.
    pub port: u16,
    /// Delay between a successful login and the server shutting down
    pub shutdown_grace: Duration,
}

impl Default for CallbackServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_CALLBACK_PORT,
            shutdown_grace: Duration::from_millis(CALLBACK_SHUTDOWN_GRACE_MS),
        }
    }
}

impl CallbackServerConfig {
    #[must_use]
    pub fn with_port(port: u16) -> Self {
        Self { port, ..Self::default() }
    }
}

struct RunningServer {
    port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

struct ServerInner {
    config: CallbackServerConfig,
    handler: Arc<dyn CallbackHandler>,
    window: Option<Arc<dyn WindowController>>,
    running: Mutex<Option<RunningServer>>,
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut() {
            if let Some(tx) = running.shutdown_tx.take() {
                let _ = tx.send(());
            }
            if let Some(handle) = running.handle.take() {
                if !handle.is_finished() {
                    handle.abort();
                }
            }
        }
    }
}

#[derive(Clone)]
struct RouteState {
    server: Weak<ServerInner>,
    handler: Arc<dyn CallbackHandler>,
    window: Option<Arc<dyn WindowController>>,
    port: u16,
    shutdown_grace: Duration,
}

/// Loopback HTTP server receiving authorization redirects
///
/// Clones share the same listener. `start` and `stop` are idempotent.
#[derive(Clone)]
pub struct LoopbackCallbackServer {
    inner: Arc<ServerInner>,
}

impl std::fmt::Debug for LoopbackCallbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackCallbackServer")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl LoopbackCallbackServer {
    #[must_use]
    pub fn new(config: CallbackServerConfig, handler: Arc<dyn CallbackHandler>) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                config,
                handler,
                window: None,
                running: Mutex::new(None),
            }),
        }
    }

    /// Restore, focus and reload this window after a successful login.
    ///
    /// Must be called before the server is shared.
    #[must_use]
    pub fn with_window(self, window: Arc<dyn WindowController>) -> Self {
        let config = self.inner.config;
        let handler = Arc::clone(&self.inner.handler);
        Self {
            inner: Arc::new(ServerInner {
                config,
                handler,
                window: Some(window),
                running: Mutex::new(None),
            }),
        }
    }

    /// Bind `127.0.0.1:<port>` and serve `/callback`. Returns the bound port.
    ///
    /// Calling `start` on a running server returns its port without
    /// rebinding. The port is registered with the callback handler so the
    /// next authorize request uses the loopback redirect.
    ///
    /// # Errors
    /// Returns `LoopgateError::Network` if the port cannot be bound.
    pub async fn start(&self) -> Result<u16> {
        let mut running = self.inner.running.lock().await;
        if let Some(current) = running.as_ref() {
            return Ok(current.port);
        }

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.inner.config.port));
        let listener = TcpListener::bind(addr).await.map_err(|err| {
            LoopgateError::Network(format!("failed to bind loopback callback server on {addr}: {err}"))
        })?;
        let port = listener
            .local_addr()
            .map_err(|err| LoopgateError::Network(format!("failed to determine port: {err}")))?
            .port();

        let state = RouteState {
            server: Arc::downgrade(&self.inner),
            handler: Arc::clone(&self.inner.handler),
            window: self.inner.window.clone(),
            port,
            shutdown_grace: self.inner.config.shutdown_grace,
        };
        let app = router(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!(event = "callback_server.error", error = %err, "Loopback callback server error");
            }
        });

        *running = Some(RunningServer { port, shutdown_tx: Some(shutdown_tx), handle: Some(handle) });
        drop(running);

        self.inner.handler.register_callback_port(Some(port));
        info!(event = "callback_server.listening", port, "Loopback callback server listening");
        Ok(port)
    }

    /// Stop listening and clear the handler's callback port.
    ///
    /// In-flight requests get up to the shutdown grace to finish. Calling
    /// `stop` on a stopped server does nothing.
    pub async fn stop(&self) {
        let Some(mut running) = self.inner.running.lock().await.take() else {
            return;
        };

        if let Some(tx) = running.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.inner.handler.register_callback_port(None);

        if let Some(mut handle) = running.handle.take() {
            let grace = self.inner.config.shutdown_grace.max(Duration::from_millis(100));
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!(event = "callback_server.shutdown_timeout", "Aborting loopback callback server");
                handle.abort();
            }
        }

        info!(event = "callback_server.stopped", port = running.port, "Loopback callback server stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }

    /// Bound port while running
    pub async fn port(&self) -> Option<u16> {
        self.inner.running.lock().await.as_ref().map(|r| r.port)
    }
}

fn router(state: RouteState) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(callback).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

async fn callback(
    State(state): State<RouteState>,
    uri: Uri,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    let has_code = params.get("code").is_some_and(|code| !code.is_empty());
    let has_state = params.get("state").is_some_and(|state| !state.is_empty());
    if !has_code || !has_state {
        warn!(
            event = "callback_server.request_rejected",
            has_code,
            has_state,
            "Loopback redirect missing code or state"
        );
        return (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE));
    }

    let redirect_url = format!(
        "http://127.0.0.1:{}{}?{}",
        state.port,
        uri.path(),
        raw_query.unwrap_or_default()
    );

    match state.handler.handle_callback(&redirect_url).await {
        Ok(_) => {
            info!(event = "callback_server.callback_completed", "Login completed via loopback");
            if let Some(window) = &state.window {
                window.bring_to_front();
                window.reload();
            }
            schedule_stop(state.server.clone(), state.shutdown_grace);
            (StatusCode::OK, Html(SUCCESS_PAGE))
        }
        Err(err) => {
            warn!(
                event = "callback_server.callback_failed",
                reason = err.label(),
                error = %err,
                "Loopback redirect rejected"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Html(FAILURE_PAGE))
        }
    }
}

fn schedule_stop(server: Weak<ServerInner>, grace: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        if let Some(inner) = server.upgrade() {
            debug!(event = "callback_server.grace_elapsed", "Stopping loopback server after login");
            LoopbackCallbackServer { inner }.stop().await;
        }
    });
}
