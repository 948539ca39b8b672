//! Configuration management for alertengine

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::OrgRole;

/// Environment variable prefix, e.g. `ALERTENGINE__ALERTING__NOTIFICATION_TIMEOUT=10s`
pub const ENV_PREFIX: &str = "ALERTENGINE";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application identity used in notification payloads
    pub app: AppConfig,

    /// Alerting configuration
    pub alerting: AlertingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the environment.
    ///
    /// When `path` is `None` the per-user config file is used if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration file");
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(path) = default_config_path() {
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.app.root_url)
            .map_err(|e| Error::config(format!("app.root_url is not a valid URL: {e}")))?;

        if self.alerting.notification_timeout.is_zero() {
            return Err(Error::config("alerting.notification_timeout must be positive"));
        }
        if self.alerting.evaluation_interval.is_zero() {
            return Err(Error::config("alerting.evaluation_interval must be positive"));
        }
        if self.alerting.max_match_fields == 0 {
            return Err(Error::config("alerting.max_match_fields must be at least 1"));
        }
        if self.alerting.max_concurrent_evaluations == 0 {
            return Err(Error::config(
                "alerting.max_concurrent_evaluations must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Location of the per-user configuration file
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "alertengine", "alertengine")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Application identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Public base URL used to build deep links back to rules
    pub root_url: String,
    /// Version string shown in notification footers
    pub build_version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_url: "http://localhost:3000/".to_string(),
            build_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Alerting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Whether the engine loop evaluates rules at all
    pub execute_alerts: bool,
    /// How often the engine looks for due rules
    #[serde(with = "humantime_serde")]
    pub evaluation_interval: Duration,
    /// Upper bound for a single notifier invocation
    #[serde(with = "humantime_serde")]
    pub notification_timeout: Duration,
    /// Maximum rules evaluated in parallel
    pub max_concurrent_evaluations: usize,
    /// Maximum evaluation matches included in a notification payload
    pub max_match_fields: usize,
    /// Lowest role allowed to read alert rules
    pub min_read_role: OrgRole,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            execute_alerts: true,
            evaluation_interval: Duration::from_secs(1),
            notification_timeout: Duration::from_secs(30),
            max_concurrent_evaluations: 10,
            max_match_fields: 5,
            min_read_role: OrgRole::Viewer,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
