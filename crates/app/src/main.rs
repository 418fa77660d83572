//! Loopgate - desktop OAuth 2.0 + PKCE shell
//!
//! Headless entry point: loads configuration, claims the single-instance
//! lock, starts the redirect transports and waits for Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use loopgate_app::{AppContext, ConsoleWindow, HostBindings, UnbundledRegistrar};
use loopgate_infra::config;
use loopgate_infra::instance::{InstanceRole, SingleInstanceCoordinator};
use loopgate_infra::observability::{init_tracing, LogSettings};
use loopgate_infra::platform::{Platform, SystemBrowser};

#[derive(Debug, Parser)]
#[command(name = "loopgate", version, about = "Desktop OAuth 2.0 + PKCE authorization shell")]
struct Cli {
    /// Open the provider's login page once started
    #[arg(long)]
    login: bool,

    /// Config file (TOML or JSON); environment variables still override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the single-instance lock file
    #[arg(long, value_name = "DIR")]
    lock_dir: Option<PathBuf>,

    /// Extra launch arguments, e.g. a redirect URL handed over by the OS
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Loaded before configuration so .env values reach the env overrides
    let dotenv = dotenvy::dotenv();

    let (app_config, source) =
        config::load_with_source(cli.config).context("failed to load configuration")?;

    init_tracing(&LogSettings::from_config(&app_config.logging))
        .context("failed to initialize logging")?;
    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "Loaded .env"),
        Err(err) => tracing::debug!(error = %err, "No .env loaded"),
    }
    match &source {
        Some(path) => tracing::info!(path = %path.display(), "Configuration file loaded"),
        None => tracing::debug!("No config file found, using defaults"),
    }
    tracing::info!(
        auth_enabled = app_config.auth.enabled,
        callback_port = app_config.transport.callback_port,
        "Configuration loaded"
    );

    app_config.validate().context("invalid configuration")?;

    let lock_dir = cli.lock_dir.unwrap_or_else(|| std::env::temp_dir().join("loopgate"));
    let coordinator =
        SingleInstanceCoordinator::new(lock_dir, app_config.transport.auth_scheme.clone());
    let launch_args: Vec<String> = std::env::args().take(1).chain(cli.args).collect();

    let instance = match coordinator.acquire(&launch_args).await? {
        InstanceRole::Primary(instance) => instance,
        InstanceRole::Secondary => {
            tracing::info!("Another instance is running; handed over launch arguments");
            return Ok(());
        }
    };

    let host = HostBindings {
        window: Arc::new(ConsoleWindow),
        registrar: Arc::new(UnbundledRegistrar),
        browser: Arc::new(SystemBrowser),
    };
    let context = AppContext::start(app_config, Platform::current(), instance, host).await?;

    if cli.login {
        context.login().await.context("failed to start login")?;
    }

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    context.shutdown().await;
    Ok(())
}
