//! Configuration management

use serde::{Deserialize, Serialize};

use crate::constants::{
    CALLBACK_HOST, DEFAULT_APP_SCHEME, DEFAULT_AUTH_SCHEME, DEFAULT_CALLBACK_PORT, DEFAULT_SCOPES,
    INDEX_DOCUMENT,
};
use crate::errors::{LoopgateError, Result};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub auth: AuthSettings,
    pub transport: TransportSettings,
    pub resources: ResourceSettings,
    pub logging: LoggingSettings,
}

/// Identity provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// When false the app starts without any authorization machinery.
    pub enabled: bool,
    /// Provider domain, e.g. `dev-abc123.us.auth0.com`
    pub domain: String,
    pub client_id: String,
    pub audience: Option<String>,
    pub scopes: Vec<String>,
    /// Explicit redirect URI. Defaults to `<auth_scheme>://callback`.
    pub redirect_uri: Option<String>,
}

/// Callback transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub auth_scheme: String,
    pub callback_port: u16,
    pub loopback_enabled: bool,
    pub scheme_enabled: bool,
}

/// Packaged resource settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    pub app_scheme: String,
    /// Directory served through the app scheme. Unset disables the handler.
    pub root: Option<String>,
    pub index_document: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Verbose authorization logging (`LOOPGATE_AUTH_DEBUG`)
    pub auth_debug: bool,
    /// Development build flag; sensitive values are only logged when this
    /// and `auth_debug` are both set.
    pub development: bool,
    pub json: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            domain: String::new(),
            client_id: String::new(),
            audience: None,
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            redirect_uri: None,
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            callback_port: DEFAULT_CALLBACK_PORT,
            loopback_enabled: true,
            scheme_enabled: true,
        }
    }
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            app_scheme: DEFAULT_APP_SCHEME.to_string(),
            root: None,
            index_document: INDEX_DOCUMENT.to_string(),
        }
    }
}

impl AppConfig {
    /// Redirect URI registered with the provider for the scheme transport.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        self.auth
            .redirect_uri
            .clone()
            .unwrap_or_else(|| format!("{}://{}", self.transport.auth_scheme, CALLBACK_HOST))
    }

    /// Check the configuration before anything is started.
    ///
    /// # Errors
    /// Returns `LoopgateError::Config` when authentication is enabled without
    /// a provider domain or client id, or when a scheme name is not a valid
    /// URI scheme.
    pub fn validate(&self) -> Result<()> {
        validate_scheme(&self.transport.auth_scheme)?;
        validate_scheme(&self.resources.app_scheme)?;

        if self.transport.auth_scheme == self.resources.app_scheme {
            return Err(LoopgateError::Config(
                "auth scheme and app scheme must differ".to_string(),
            ));
        }

        if !self.auth.enabled {
            return Ok(());
        }

        let mut missing = Vec::new();
        if self.auth.domain.trim().is_empty() {
            missing.push("LOOPGATE_AUTH_DOMAIN");
        }
        if self.auth.client_id.trim().is_empty() {
            missing.push("LOOPGATE_AUTH_CLIENT_ID");
        }

        if !missing.is_empty() {
            return Err(LoopgateError::Config(format!(
                "authentication is enabled but {} {} not set; set them in the environment or \
                 .env, or set LOOPGATE_AUTH_ENABLED=false to disable authentication",
                missing.join(" and "),
                if missing.len() == 1 { "is" } else { "are" }
            )));
        }

        Ok(())
    }
}

/// RFC 3986 scheme: `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`
fn validate_scheme(scheme: &str) -> Result<()> {
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(LoopgateError::Config(format!("invalid URI scheme: {scheme:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.enabled = true;
        config.auth.domain = "dev-test.us.auth0.com".to_string();
        config.auth.client_id = "client123".to_string();
        config
    }

    #[test]
    fn disabled_auth_skips_provider_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn enabled_auth_requires_domain_and_client_id() {
        let mut config = enabled_config();
        config.auth.domain = "  ".to_string();
        config.auth.client_id.clear();

        let err = config.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("LOOPGATE_AUTH_DOMAIN and LOOPGATE_AUTH_CLIENT_ID are not set"));
        assert!(message.contains("LOOPGATE_AUTH_ENABLED=false"));
    }

    #[test]
    fn enabled_auth_with_provider_is_valid() {
        assert!(enabled_config().validate().is_ok());
    }

    #[test]
    fn redirect_uri_defaults_to_auth_scheme() {
        let config = AppConfig::default();
        assert_eq!(config.redirect_uri(), "loopgate://callback");

        let mut custom = AppConfig::default();
        custom.auth.redirect_uri = Some("myapp://callback".to_string());
        assert_eq!(custom.redirect_uri(), "myapp://callback");
    }

    #[test]
    fn rejects_invalid_or_shared_schemes() {
        let mut config = AppConfig::default();
        config.transport.auth_scheme = "1bad".to_string();
        assert!(config.validate().is_err());

        let mut shared = AppConfig::default();
        shared.resources.app_scheme = shared.transport.auth_scheme.clone();
        assert!(shared.validate().is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
[auth]
enabled = true
domain = "example.auth0.com"
client_id = "abc"
"#,
        )
        .unwrap();

        assert_eq!(config.transport.callback_port, DEFAULT_CALLBACK_PORT);
        assert_eq!(config.auth.scopes.len(), 4);
        assert_eq!(config.resources.index_document, "index.html");
        assert!(config.validate().is_ok());
    }
}
