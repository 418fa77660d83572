//! Single-instance coordination
//!
//! The first process to create the lock file becomes primary and listens on
//! a loopback port for messages from later launches. A later launch forwards
//! its arguments to the primary and exits. On platforms that deliver custom
//! scheme redirects by launching a new process, one of those arguments is
//! the `<auth-scheme>://callback?...` URL, which the primary replays into
//! the authorization session.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use loopgate_common::auth::{CallbackHandler, WindowController};
use loopgate_domain::{LoopgateError, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::lock::{is_process_running, InstanceLock, LockRecord};

const FORWARD_TIMEOUT: Duration = Duration::from_secs(2);
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_MESSAGE_BYTES: u64 = 64 * 1024;

/// One line of JSON sent by a secondary launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondInstanceMessage {
    pub args: Vec<String>,
}

/// Outcome of [`SingleInstanceCoordinator::acquire`]
#[derive(Debug)]
pub enum InstanceRole {
    /// This process owns the lock
    Primary(PrimaryInstance),
    /// Arguments were handed to the running primary; exit now
    Secondary,
}

/// Decides which launch owns the application
#[derive(Debug, Clone)]
pub struct SingleInstanceCoordinator {
    lock_dir: PathBuf,
    auth_scheme: String,
}

impl SingleInstanceCoordinator {
    #[must_use]
    pub fn new(lock_dir: impl Into<PathBuf>, auth_scheme: impl Into<String>) -> Self {
        Self { lock_dir: lock_dir.into(), auth_scheme: auth_scheme.into() }
    }

    #[must_use]
    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Take the lock or hand `args` to the process holding it.
    ///
    /// A lock whose owner is dead, whose file is unreadable, or whose IPC
    /// port refuses connections is removed and acquisition is retried once.
    ///
    /// # Errors
    /// Returns `LoopgateError::LockAcquisitionFailed` when the lock directory
    /// or file cannot be created, the IPC listener cannot bind, or the lock
    /// is still held after the retry.
    pub async fn acquire(&self, args: &[String]) -> Result<InstanceRole> {
        std::fs::create_dir_all(&self.lock_dir).map_err(|e| {
            LoopgateError::LockAcquisitionFailed(format!(
                "cannot create lock directory {}: {e}",
                self.lock_dir.display()
            ))
        })?;

        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .map_err(|e| {
                LoopgateError::LockAcquisitionFailed(format!("cannot bind IPC listener: {e}"))
            })?;
        let ipc_port = listener
            .local_addr()
            .map_err(|e| LoopgateError::LockAcquisitionFailed(format!("IPC listener address: {e}")))?
            .port();
        let record = LockRecord { pid: std::process::id(), ipc_port };

        for attempt in 0..2 {
            let created = InstanceLock::try_create(&self.lock_dir, record).map_err(|e| {
                LoopgateError::LockAcquisitionFailed(format!("failed to create lock file: {e}"))
            })?;
            if let Some(lock) = created {
                return Ok(InstanceRole::Primary(PrimaryInstance {
                    lock,
                    listener: Some(listener),
                    auth_scheme: self.auth_scheme.clone(),
                    task: None,
                }));
            }

            match InstanceLock::read(&self.lock_dir) {
                Some(owner) if is_process_running(owner.pid) => {
                    match forward(owner.ipc_port, args).await {
                        Ok(()) => {
                            info!(owner_pid = owner.pid, "instance_lock.process_active");
                            return Ok(InstanceRole::Secondary);
                        }
                        Err(err) => {
                            warn!(owner_pid = owner.pid, error = %err, "instance_lock.owner_unreachable");
                        }
                    }
                }
                Some(owner) => warn!(stale_pid = owner.pid, "instance_lock.stale_lock_detected"),
                None => warn!("instance_lock.unreadable_lock_detected"),
            }

            if attempt == 0 {
                InstanceLock::remove_stale(&self.lock_dir);
            }
        }

        Err(LoopgateError::LockAcquisitionFailed(
            "another instance holds the lock and could not be reached".to_string(),
        ))
    }
}

/// Send `args` to the primary listening on `port`.
async fn forward(port: u16, args: &[String]) -> std::io::Result<()> {
    let message = SecondInstanceMessage { args: args.to_vec() };
    let mut line = serde_json::to_vec(&message).map_err(std::io::Error::other)?;
    line.push(b'\n');

    let send = async {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await?;
        stream.write_all(&line).await?;
        stream.shutdown().await
    };

    tokio::time::timeout(FORWARD_TIMEOUT, send)
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "forward timed out"))?
}

/// The running primary; dropping it stops the IPC listener and removes the
/// lock file.
#[derive(Debug)]
pub struct PrimaryInstance {
    lock: InstanceLock,
    listener: Option<TcpListener>,
    auth_scheme: String,
    task: Option<JoinHandle<()>>,
}

impl PrimaryInstance {
    #[must_use]
    pub fn ipc_port(&self) -> u16 {
        self.lock.record().ipc_port
    }

    #[must_use]
    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    /// Start accepting second-instance messages.
    ///
    /// Each message restores and focuses `window`, then replays the first
    /// argument that starts with `<auth-scheme>://` into `handler`. Calling
    /// `serve` again does nothing.
    pub fn serve(&mut self, handler: Arc<dyn CallbackHandler>, window: Arc<dyn WindowController>) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let prefix = format!("{}://", self.auth_scheme);

        self.task = Some(tokio::spawn(async move {
            loop {
                let (stream, peer) = accept_with_backoff(|| listener.accept()).await;
                debug!(event = "instance.connection", %peer, "Second instance connected");

                let handler = Arc::clone(&handler);
                let window = Arc::clone(&window);
                let prefix = prefix.clone();
                tokio::spawn(async move {
                    match read_message(stream).await {
                        Ok(message) => {
                            on_second_instance(message, &prefix, handler.as_ref(), window.as_ref())
                                .await;
                        }
                        Err(err) => {
                            warn!(event = "instance.message_invalid", error = %err, "Ignoring IPC message");
                        }
                    }
                });
            }
        }));

        info!(event = "instance.serving", ipc_port = self.ipc_port(), "Listening for second instances");
    }
}

impl Drop for PrimaryInstance {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn read_message(stream: TcpStream) -> std::io::Result<SecondInstanceMessage> {
    let mut reader = BufReader::new(stream.take(MAX_MESSAGE_BYTES));
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    serde_json::from_str(line.trim_end()).map_err(std::io::Error::other)
}

async fn on_second_instance(
    message: SecondInstanceMessage,
    prefix: &str,
    handler: &dyn CallbackHandler,
    window: &dyn WindowController,
) {
    info!(event = "instance.second_instance", args = message.args.len(), "Second instance launched");
    window.bring_to_front();

    let Some(redirect) = message
        .args
        .iter()
        .find(|arg| arg.get(..prefix.len()).is_some_and(|head| head.eq_ignore_ascii_case(prefix)))
    else {
        return;
    };

    match handler.handle_callback(redirect).await {
        Ok(_) => info!(event = "instance.callback_replayed", "Login completed from second instance"),
        Err(err) => warn!(
            event = "instance.callback_failed",
            reason = err.label(),
            error = %err,
            "Redirect from second instance rejected"
        ),
    }
}

/// Wait for the next connection, pausing after each failed `accept`.
async fn accept_with_backoff<T, E, F, Fut>(mut accept: F) -> T
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, E>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(err) => {
                warn!(event = "instance.accept_failed", error = %err, "IPC accept failed");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}
