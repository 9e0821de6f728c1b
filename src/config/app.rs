//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::collector::ping::PingConfig;
use crate::collector::snmp::SnmpConfig;
use crate::collector::{
    DEFAULT_CONCURRENCY, DEFAULT_INTERVAL, DEFAULT_QUEUE_CAPACITY, EngineConfig, MIN_INTERVAL,
};
use crate::reporter::ReporterConfig;

use super::validation::{ConfigError, expand_env_vars, validate_endpoint};

// =============================================================================
// Constants
// =============================================================================

/// Default HTTP timeout for API calls (10 seconds).
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(10);

/// Default fleet refresh period (5 minutes).
pub const DEFAULT_DEVICE_SYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Default heartbeat period (30 seconds).
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn default_api_timeout() -> Duration {
    DEFAULT_API_TIMEOUT
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_device_sync_interval() -> Duration {
    DEFAULT_DEVICE_SYNC_INTERVAL
}

fn default_heartbeat_interval() -> Duration {
    DEFAULT_HEARTBEAT_INTERVAL
}

fn default_log_level() -> String {
    "info".to_string()
}

// =============================================================================
// API Configuration
// =============================================================================

/// Remote collection API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL, e.g. `http://netvis:3000/api`. `${VAR}` placeholders are expanded.
    pub endpoint: String,

    /// Bearer token. Empty disables the Authorization header.
    #[serde(default)]
    pub token: String,

    /// Per-request timeout (default: 10s).
    #[serde(default = "default_api_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

// =============================================================================
// Collector Configuration
// =============================================================================

/// Collector identity, polling and timer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Identifier announced to the API.
    pub id: String,

    /// Human-readable name (default: the id).
    #[serde(default)]
    pub name: String,

    /// Polling cycle interval (default: 60s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Concurrent device probes (default: 10).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Metrics queue capacity (default: 1000).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Fleet refresh period (default: 5m).
    #[serde(default = "default_device_sync_interval", with = "humantime_serde")]
    pub device_sync_interval: Duration,

    /// Heartbeat period (default: 30s).
    #[serde(default = "default_heartbeat_interval", with = "humantime_serde")]
    pub heartbeat_interval: Duration,
}

impl CollectorConfig {
    /// Engine settings derived from this section.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig::default()
            .with_interval(self.interval)
            .with_concurrency(self.concurrency)
            .with_queue_capacity(self.queue_capacity)
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Log output format.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (default: "info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (default: json).
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Values that take precedence over the file (CLI flags or their env vars).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub api_endpoint: Option<String>,
    pub api_token: Option<String>,
}

/// Top-level application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote API settings.
    pub api: ApiConfig,

    /// Collector identity and cadences.
    pub collector: CollectorConfig,

    /// SNMP transport settings.
    #[serde(default)]
    pub snmp: SnmpConfig,

    /// ICMP probe settings.
    #[serde(default)]
    pub ping: PingConfig,

    /// Batching settings.
    #[serde(default)]
    pub reporter: ReporterConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file and apply `overrides`.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::parse(&content)?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML and expand env placeholders in the API section.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.api.endpoint = expand_env_vars(&config.api.endpoint);
        config.api.token = expand_env_vars(&config.api.token);
        Ok(config)
    }

    /// Replace file values with explicitly provided ones.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(endpoint) = &overrides.api_endpoint {
            self.api.endpoint = endpoint.clone();
        }
        if let Some(token) = &overrides.api_token {
            self.api.token = token.clone();
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collector.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "collector.id must be non-empty".to_string(),
            ));
        }

        validate_endpoint(&self.api.endpoint)?;

        if self.api.timeout.is_zero() {
            return Err(ConfigError::Validation(
                "api.timeout must be non-zero".to_string(),
            ));
        }

        // Zero means "use the default"; anything else must be at least MIN_INTERVAL.
        if !self.collector.interval.is_zero() && self.collector.interval < MIN_INTERVAL {
            return Err(ConfigError::Validation(format!(
                "collector.interval must be at least {}",
                humantime::format_duration(MIN_INTERVAL)
            )));
        }

        Ok(())
    }

    /// Replace zero timer and probe values with their defaults, logging each.
    ///
    /// Engine and reporter settings are normalized by those components.
    pub fn normalize(&mut self) {
        if self.collector.device_sync_interval.is_zero() {
            tracing::warn!("Zero collector.device_sync_interval, using default");
            self.collector.device_sync_interval = DEFAULT_DEVICE_SYNC_INTERVAL;
        }
        if self.collector.heartbeat_interval.is_zero() {
            tracing::warn!("Zero collector.heartbeat_interval, using default");
            self.collector.heartbeat_interval = DEFAULT_HEARTBEAT_INTERVAL;
        }
        let ping_defaults = PingConfig::default();
        if self.ping.count == 0 {
            tracing::warn!(default = ping_defaults.count, "Zero ping.count, using default");
            self.ping.count = ping_defaults.count;
        }
        if self.ping.timeout.is_zero() {
            tracing::warn!("Zero ping.timeout, using default");
            self.ping.timeout = ping_defaults.timeout;
        }
        let snmp_defaults = SnmpConfig::default();
        if self.snmp.port == 0 {
            tracing::warn!(default = snmp_defaults.port, "Zero snmp.port, using default");
            self.snmp.port = snmp_defaults.port;
        }
        if self.snmp.timeout.is_zero() {
            tracing::warn!("Zero snmp.timeout, using default");
            self.snmp.timeout = snmp_defaults.timeout;
        }
    }
}
