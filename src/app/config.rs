use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Batch sending parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Base delay before the next send attempt, in seconds.
    pub sending_delay_secs: f64,
    /// Number of buffered events that seals a batch.
    pub size: usize,
    /// Period of the scheduled batch sealing timer, in seconds.
    pub sending_timer_interval_secs: f64,
    /// Timeout for a single batch transmission, in seconds.
    pub request_timeout_secs: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            sending_delay_secs: 2.0,
            size: 200,
            sending_timer_interval_secs: 10.0,
            request_timeout_secs: 30.0,
        }
    }
}

/// Batch splitting thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSizeConfig {
    pub bytes_per_kb: usize,
    pub max_batch_size_kb: usize,
}

impl BatchSizeConfig {
    pub fn max_batch_bytes(&self) -> usize {
        self.bytes_per_kb * self.max_batch_size_kb
    }
}

impl Default for BatchSizeConfig {
    fn default() -> Self {
        Self {
            bytes_per_kb: 1024,
            max_batch_size_kb: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    /// Period of the user-engagement reporting timer, in seconds.
    pub timer_interval_secs: f64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            timer_interval_secs: 30.0,
        }
    }
}

/// Top-level pipeline configuration. Hosts typically deserialize this from
/// their own config source and override what they need.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Auth key for the collector endpoint.
    pub api_key: String,
    /// Collector URL batches are POSTed to.
    pub endpoint: String,
    /// Directory for the durable batch store and the pending-batches ledger.
    pub storage_dir: PathBuf,
    /// Marks the very first launch; emits `first_open` and tags batches.
    pub is_first_launch: bool,
    /// Static metadata attached to every batch (device id, app version...).
    pub meta: serde_json::Map<String, serde_json::Value>,
    pub batch: BatchConfig,
    pub batch_size: BatchSizeConfig,
    pub engagement: EngagementConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://collector.example.com/v1/events".to_string(),
            storage_dir: std::env::temp_dir().join("pulse-telemetry"),
            is_first_launch: false,
            meta: serde_json::Map::new(),
            batch: BatchConfig::default(),
            batch_size: BatchSizeConfig::default(),
            engagement: EngagementConfig::default(),
        }
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::InvalidConfig("api_key must not be empty".to_string()));
        }
        if url::Url::parse(&self.endpoint).is_err() {
            return Err(ConfigError::InvalidUrl(self.endpoint.clone()));
        }
        if self.batch.size == 0 {
            return Err(ConfigError::InvalidConfig("batch size must be at least 1".to_string()));
        }
        for (name, value) in [
            ("sending_delay_secs", self.batch.sending_delay_secs),
            ("sending_timer_interval_secs", self.batch.sending_timer_interval_secs),
            ("request_timeout_secs", self.batch.request_timeout_secs),
            ("engagement timer_interval_secs", self.engagement.timer_interval_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if self.batch_size.bytes_per_kb == 0 || self.batch_size.max_batch_size_kb == 0 {
            return Err(ConfigError::InvalidConfig(
                "batch size thresholds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
