//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LoggingConfig};

/// Build the filter: `RUST_LOG` when set, else the configured level.
pub fn filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|e| {
            eprintln!("invalid log level '{}': {e}, using info", config.level);
            EnvFilter::new("info")
        })
}

/// Install the global subscriber.
///
/// # Errors
/// Fails if a global subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(filter(config));
    match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_level() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            format: LogFormat::Text,
        };
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(
                filter(&config).max_level_hint(),
                Some(tracing_subscriber::filter::LevelFilter::WARN)
            );
        }
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!(LogFormat::Text.as_ref(), "text");
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
