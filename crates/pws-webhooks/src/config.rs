use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::App;
use crate::policy::{
    AckAlways, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAYS_SECS, DeliveryPolicy, RetryWithBackoff,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(String),

    #[error("config deserialize error: {0}")]
    Deserialize(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub instance: InstanceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Applications and their registered webhooks
    #[serde(default)]
    pub apps: Vec<App>,
}

impl WebhooksConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        if self.instance.process_id.is_empty() {
            return Err(ConfigError::Invalid("instance.process_id must not be empty".into()));
        }
        if self.delivery.concurrency == 0 {
            return Err(ConfigError::Invalid("delivery.concurrency must be > 0".into()));
        }
        if self.delivery.timeout_ms == 0 || self.delivery.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("delivery timeouts must be > 0".into()));
        }
        let retry = &self.delivery.retry;
        if retry.enabled && retry.delays_secs.len() < retry.max_attempts as usize {
            return Err(ConfigError::Invalid(
                "delivery.retry.delays_secs must cover delivery.retry.max_attempts".into(),
            ));
        }
        for app in &self.apps {
            if app.key.is_empty() || app.secret.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "app '{}' requires both key and secret",
                    app.id
                )));
            }
            if let Some(endpoint) = app.webhooks.iter().find(|w| url::Url::parse(&w.url).is_err()) {
                return Err(ConfigError::Invalid(format!(
                    "app '{}' has an invalid webhook url: {}",
                    app.id, endpoint.url
                )));
            }
            for endpoint in app.webhooks.iter().filter(|w| !w.ignored_event_types.is_empty()) {
                tracing::warn!(
                    app = %app.id,
                    url = %endpoint.url,
                    ignored = ?endpoint.ignored_event_types,
                    "Webhook subscribes to event kinds that are never sent"
                );
            }
        }
        Ok(())
    }

    pub fn find_app(&self, key: &str) -> Option<&App> {
        self.apps.iter().find(|app| app.key == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Identifies this process in the `User-Agent` of outgoing webhooks
    #[serde(default = "default_process_id")]
    pub process_id: String,
}

fn default_process_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".into());
    format!("{host}-{}", std::process::id())
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            process_id: default_process_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Maximum number of deliveries in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_concurrency() -> usize {
    8
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            concurrency: default_concurrency(),
            retry: RetryConfig::default(),
        }
    }
}

impl DeliveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Retries are off by default: failed deliveries are dropped after one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delays_secs")]
    pub delays_secs: Vec<u64>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_delays_secs() -> Vec<u64> {
    DEFAULT_RETRY_DELAYS_SECS.to_vec()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: default_max_attempts(),
            delays_secs: default_delays_secs(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> Arc<dyn DeliveryPolicy> {
        if self.enabled {
            Arc::new(RetryWithBackoff::from_secs(self.max_attempts, &self.delays_secs))
        } else {
            Arc::new(AckAlways)
        }
    }
}

pub mod loader {
    use super::{ConfigError, WebhooksConfig};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "pws.toml";

    pub fn load_config(path: Option<&str>) -> Result<WebhooksConfig, ConfigError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(ConfigError::Build(format!(
                "config file not found: {}",
                pathbuf.display()
            )));
        }
        // Environment variable overrides, e.g., PWS__DELIVERY__CONCURRENCY=4
        builder = builder.add_source(
            Environment::with_prefix("PWS")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Build(e.to_string()))?;
        let merged: WebhooksConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Deserialize(e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }
}
