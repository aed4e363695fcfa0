//! Configuration loading for the Salmart sync client.
//!
//! Connection settings are required. The `[cache]` and `[logging]` sections
//! fall back to documented defaults when omitted.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "SALMART_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub ws_endpoint: String,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub auth: AuthConfig,
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session credentials. Both absent means an anonymous session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub token: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            max_ms: 30_000,
            multiplier: 2.0,
            jitter_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
    #[serde(default = "default_message_max_attempts")]
    pub message_max_attempts: u32,
    /// Directory of the durable store. Absent selects the no-op store.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default = "default_map_size_mb")]
    pub map_size_mb: usize,
    /// Feed categories loaded at startup.
    #[serde(default)]
    pub warm_categories: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            freshness_window_secs: default_freshness_window_secs(),
            message_max_attempts: default_message_max_attempts(),
            store_path: None,
            map_size_mb: default_map_size_mb(),
            warm_categories: Vec::new(),
        }
    }
}

fn default_freshness_window_secs() -> u64 {
    300
}

fn default_message_max_attempts() -> u32 {
    3
}

fn default_map_size_mb() -> usize {
    64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or SALMART_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl From<ConfigError> for salmart_core::SalmartError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidValue { field, reason } => Self::Config {
                field: field.to_string(),
                reason,
            },
            other => Self::Config {
                field: "config".to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl ClientConfig {
    /// Load from `--config <path>` or `SALMART_CONFIG`, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.cache.freshness_window_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if self.ws_endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ws_endpoint",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.ws_endpoint.starts_with("ws://") && !self.ws_endpoint.starts_with("wss://") {
            return Err(ConfigError::InvalidValue {
                field: "ws_endpoint",
                reason: "must be a ws(s) URL".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if let Some(token) = &self.auth.token {
            if token.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "auth.token",
                    reason: "must not be empty when set".to_string(),
                });
            }
            if self.auth.user_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: "auth.user_id",
                    reason: "required when a token is configured".to_string(),
                });
            }
        }
        if self.reconnect.initial_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.initial_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.reconnect.max_ms < self.reconnect.initial_ms {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.max_ms",
                reason: "must be >= initial_ms".to_string(),
            });
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.multiplier",
                reason: "must be >= 1.0".to_string(),
            });
        }
        if self.cache.freshness_window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.freshness_window_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.message_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.message_max_attempts",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.cache.map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.map_size_mb",
                reason: "must be > 0".to_string(),
            });
        }
        if let Some(path) = &self.cache.store_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "cache.store_path",
                    reason: "must not be empty when set".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        api_base_url = "https://api.salmart.app"
        ws_endpoint = "wss://api.salmart.app/ws"
        request_timeout_ms = 10000

        [reconnect]
        initial_ms = 500
        max_ms = 30000
        multiplier = 2.0
        jitter_ms = 250
    "#;

    #[test]
    fn test_minimal_config_uses_cache_defaults() {
        let config = ClientConfig::from_toml_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.cache.freshness_window_secs, 300);
        assert_eq!(config.cache.message_max_attempts, 3);
        assert!(config.cache.store_path.is_none());
        assert!(config.auth.token.is_none());
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.freshness_window(), Duration::from_secs(300));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let contents = format!("{}\nsurprise = true\n", MINIMAL);
        assert!(matches!(
            ClientConfig::from_toml_str(&contents),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_token_requires_user_id() {
        let contents = format!("{}\n[auth]\ntoken = \"abc\"\n", MINIMAL);
        let config = ClientConfig::from_toml_str(&contents).unwrap();
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "auth.user_id"),
            other => panic!("expected invalid auth.user_id, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_shrinking_backoff() {
        let mut config = ClientConfig::from_toml_str(MINIMAL).unwrap();
        config.reconnect.multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_error_maps_to_salmart_error() {
        let err = salmart_core::SalmartError::from(ConfigError::InvalidValue {
            field: "ws_endpoint",
            reason: "must be a ws(s) URL".to_string(),
        });
        assert!(err.to_string().contains("ws_endpoint"));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("salmart.toml");
        let contents = format!(
            "{}\n[cache]\nstore_path = \"/tmp/salmart\"\nwarm_categories = [\"all\", \"electronics\"]\n\n[logging]\nformat = \"json\"\n",
            MINIMAL
        );
        std::fs::write(&path, contents).unwrap();

        let config = ClientConfig::from_path(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.cache.warm_categories, vec!["all", "electronics"]);
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
