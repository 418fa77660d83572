//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Probe for a config file; when found it becomes the base, otherwise the
//!    built-in defaults are
//! 2. Every environment variable that is set overrides the matching field
//! 3. Supports JSON and TOML formats
//!
//! Validation is left to [`AppConfig::validate`] so the caller decides how
//! to report a disabled or incomplete provider setup.
//!
//! ## Environment Variables
//! - `LOOPGATE_AUTH_ENABLED`: Whether authentication runs at all (true/false)
//! - `LOOPGATE_AUTH_DOMAIN`: Identity provider domain
//! - `LOOPGATE_AUTH_CLIENT_ID`: Public client ID
//! - `LOOPGATE_AUTH_AUDIENCE`: API audience (optional)
//! - `LOOPGATE_AUTH_SCOPES`: Space or comma separated scopes
//! - `LOOPGATE_AUTH_REDIRECT_URI`: Redirect for the custom scheme transport
//! - `LOOPGATE_AUTH_SCHEME`: Custom URI scheme for redirects
//! - `LOOPGATE_CALLBACK_PORT`: Loopback callback server port
//! - `LOOPGATE_APP_SCHEME`: Scheme serving packaged resources
//! - `LOOPGATE_RESOURCE_ROOT`: Directory served through the app scheme
//! - `LOOPGATE_AUTH_DEBUG`: Verbose authorization logging (true/false)
//! - `LOOPGATE_DEVELOPMENT`: Development build flag (true/false)
//! - `LOOPGATE_LOG_JSON`: JSON log output (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./loopgate.toml`, `./loopgate.json`, `./config.toml`, `./config.json`
//! 2. The same names in the parent and grandparent directories
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};

use loopgate_domain::{AppConfig, LoopgateError, Result};

const CONFIG_FILE_NAMES: &[&str] = &["loopgate.toml", "loopgate.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// Starts from the first config file found by [`probe_config_paths`] (or
/// the defaults when there is none) and applies environment overrides.
///
/// # Errors
/// Returns `LoopgateError::Config` if:
/// - A config file exists but cannot be read or parsed
/// - An environment variable has an invalid value
pub fn load() -> Result<AppConfig> {
    load_with_source(None).map(|(config, _)| config)
}

/// Load configuration and report the file it was based on
///
/// An explicit `path` must exist; without one the standard locations are
/// probed and a miss falls back to the defaults. Environment overrides are
/// applied either way. Nothing is logged, so callers can load before the
/// subscriber is installed and report the returned source afterwards.
///
/// # Errors
/// Returns `LoopgateError::Config` if:
/// - The explicit file is missing
/// - A config file cannot be read or parsed
/// - An environment variable has an invalid value
pub fn load_with_source(path: Option<PathBuf>) -> Result<(AppConfig, Option<PathBuf>)> {
    let source = path.or_else(probe_config_paths);
    let base = match &source {
        Some(path) => load_from_file(Some(path.clone()))?,
        None => AppConfig::default(),
    };

    Ok((apply_env(base)?, source))
}

/// Load configuration from environment variables over the defaults
///
/// # Errors
/// Returns `LoopgateError::Config` if a variable has an invalid value.
pub fn load_from_env() -> Result<AppConfig> {
    apply_env(AppConfig::default())
}

/// Apply `LOOPGATE_*` environment overrides to `config`
///
/// # Errors
/// Returns `LoopgateError::Config` if a variable has an invalid value.
pub fn apply_env(config: AppConfig) -> Result<AppConfig> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Apply overrides from `lookup`, which maps a variable name to its value.
fn apply_overrides<F>(mut config: AppConfig, lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(value) = get("LOOPGATE_AUTH_ENABLED") {
        config.auth.enabled = parse_bool("LOOPGATE_AUTH_ENABLED", &value)?;
    }
    if let Some(value) = get("LOOPGATE_AUTH_DOMAIN") {
        config.auth.domain = value;
    }
    if let Some(value) = get("LOOPGATE_AUTH_CLIENT_ID") {
        config.auth.client_id = value;
    }
    if let Some(value) = get("LOOPGATE_AUTH_AUDIENCE") {
        config.auth.audience = Some(value);
    }
    if let Some(value) = get("LOOPGATE_AUTH_SCOPES") {
        config.auth.scopes = value
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(value) = get("LOOPGATE_AUTH_REDIRECT_URI") {
        config.auth.redirect_uri = Some(value);
    }
    if let Some(value) = get("LOOPGATE_AUTH_SCHEME") {
        config.transport.auth_scheme = value;
    }
    if let Some(value) = get("LOOPGATE_CALLBACK_PORT") {
        config.transport.callback_port = value.parse::<u16>().map_err(|e| {
            LoopgateError::Config(format!("Invalid LOOPGATE_CALLBACK_PORT {value:?}: {e}"))
        })?;
    }
    if let Some(value) = get("LOOPGATE_APP_SCHEME") {
        config.resources.app_scheme = value;
    }
    if let Some(value) = get("LOOPGATE_RESOURCE_ROOT") {
        config.resources.root = Some(value);
    }
    if let Some(value) = get("LOOPGATE_AUTH_DEBUG") {
        config.logging.auth_debug = parse_bool("LOOPGATE_AUTH_DEBUG", &value)?;
    }
    if let Some(value) = get("LOOPGATE_DEVELOPMENT") {
        config.logging.development = parse_bool("LOOPGATE_DEVELOPMENT", &value)?;
    }
    if let Some(value) = get("LOOPGATE_LOG_JSON") {
        config.logging.json = parse_bool("LOOPGATE_LOG_JSON", &value)?;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
/// Fields missing from the file keep their defaults.
///
/// # Errors
/// Returns `LoopgateError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(LoopgateError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            LoopgateError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| LoopgateError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<AppConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| LoopgateError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| LoopgateError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(LoopgateError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.clone());
        dirs.push(cwd.join(".."));
        dirs.push(cwd.join("../.."));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

/// Parse a boolean flag
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(LoopgateError::Config(format!("Invalid boolean for {key}: {other:?}"))),
    }
}
