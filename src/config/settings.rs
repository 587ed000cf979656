//! TOML configuration
//!
//! ```toml
//! [metric]
//! namespace = "elva-labs"
//! name = "beerWeight"
//!
//! [alarm]
//! name = "BeerAlarm"
//! threshold = 10000
//! comparison = "LESS_THAN"
//! period_seconds = 300
//! evaluation_periods = 3
//! datapoints_to_alarm = 3
//! missing_data = "IGNORE"
//!
//! [notifications]
//! channel = "slack"
//! ```
//!
//! The evaluator fields of `[alarm]` have no defaults and must be given.

use crate::error::ConfigError;
use crate::evaluator::{ComparisonOperator, EvaluatorConfig, MissingDataPolicy};
use crate::metrics::MetricIdentity;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the Slack webhook URL
pub const SLACK_URL_ENV: &str = "SLACK_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub metric: MetricIdentity,
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Alarm definition
#[derive(Debug, Clone, Deserialize)]
pub struct AlarmConfig {
    #[serde(default = "default_alarm_name")]
    pub name: String,
    #[serde(default = "default_alarm_description")]
    pub description: String,
    pub threshold: f64,
    pub comparison: ComparisonOperator,
    pub period_seconds: u64,
    pub evaluation_periods: usize,
    pub datapoints_to_alarm: usize,
    pub missing_data: MissingDataPolicy,
    /// Where the committed state survives restarts; unset resets on start
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

fn default_alarm_name() -> String {
    "BeerAlarm".to_string()
}

fn default_alarm_description() -> String {
    "Alarm when beer weight is too low".to_string()
}

impl AlarmConfig {
    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            threshold: self.threshold,
            comparison: self.comparison,
            period_length: Duration::from_secs(self.period_seconds),
            evaluation_periods: self.evaluation_periods,
            datapoints_to_alarm: self.datapoints_to_alarm,
            missing_data: self.missing_data,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Address the TCP sample listener binds to
    pub listen: String,
    /// Longest accepted message frame
    pub max_line_bytes: usize,
    /// Upper bound on samples held in the window
    pub max_buffered_samples: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7878".to_string(),
            max_line_bytes: 4096,
            max_buffered_samples: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Embedded metric format records
    Emf,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub sink: SinkKind,
    /// File to append EMF records to; stdout when unset
    pub output: Option<PathBuf>,
    pub timeout_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Emf,
            output: None,
            timeout_ms: 2_000,
        }
    }
}

impl MetricsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Slack,
    Log,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub channel: ChannelKind,
    pub webhook_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel: ChannelKind::Log,
            webhook_url: None,
            timeout_ms: 5_000,
        }
    }
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Parse configuration from TOML text without validating it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a configuration file without validating it
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::ReadError(format!(
                "{} does not exist or is not a file",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load, complete from the environment and validate a configuration file
    ///
    /// # Errors
    ///
    /// Any read, parse or validation failure. None of them is recoverable;
    /// the process is expected to exit.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_webhook_fallback(std::env::var(SLACK_URL_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Use `webhook_url` when the file does not name one
    pub fn apply_webhook_fallback(&mut self, webhook_url: Option<String>) {
        if self.notifications.webhook_url.is_none() {
            self.notifications.webhook_url = webhook_url.filter(|url| !url.trim().is_empty());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alarm.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "alarm.name must not be empty".to_string(),
            ));
        }
        if self.metric.namespace.trim().is_empty() || self.metric.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "metric.namespace and metric.name must not be empty".to_string(),
            ));
        }

        self.alarm.evaluator_config().validate()?;

        self.ingest.listen.parse::<SocketAddr>().map_err(|e| {
            ConfigError::ValidationError(format!(
                "ingest.listen '{}' is not a socket address: {}",
                self.ingest.listen, e
            ))
        })?;
        if self.ingest.max_line_bytes == 0 || self.ingest.max_buffered_samples == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.max_line_bytes and ingest.max_buffered_samples must be positive"
                    .to_string(),
            ));
        }

        if self.metrics.timeout_ms == 0 || self.notifications.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_ms must be positive".to_string(),
            ));
        }

        if self.notifications.channel == ChannelKind::Slack {
            match self.notifications.webhook_url.as_deref() {
                Some(url) if url.starts_with("https://") || url.starts_with("http://") => {}
                Some(url) => {
                    return Err(ConfigError::ValidationError(format!(
                        "notifications.webhook_url is not an http(s) URL: {}",
                        url
                    )))
                }
                None => {
                    return Err(ConfigError::ValidationError(format!(
                        "slack channel needs notifications.webhook_url or {}",
                        SLACK_URL_ENV
                    )))
                }
            }
        }

        Ok(())
    }
}
