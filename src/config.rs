//! Configuration module for the collector agent.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Remote API settings (endpoint, bearer token, timeout)
//! - Collector identity and timer cadences
//! - SNMP, ping and reporter tuning
//! - Logging level and output format

mod app;
mod validation;

pub use app::{
    ApiConfig, AppConfig, CollectorConfig, ConfigOverrides, LogFormat, LoggingConfig,
    DEFAULT_API_TIMEOUT, DEFAULT_DEVICE_SYNC_INTERVAL, DEFAULT_HEARTBEAT_INTERVAL,
};
pub use validation::{ConfigError, expand_env_vars};
