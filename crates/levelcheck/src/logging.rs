//! Process-wide tracing setup.
//!
//! Library code logs through the `log` facade and opens `tracing` spans
//! around jobs; both end up in the same subscriber once [`init`] has run.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::ConfigError;

/// Installs the global subscriber and bridges `log` records into it.
///
/// `RUST_LOG` overrides `config.level`. Fails if a global subscriber or
/// logger is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    let env_filter = build_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => {
            let subscriber = registry.with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            );
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
        }
        LogFormat::Pretty => {
            let subscriber = registry.with(fmt::layer().with_target(true));
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
        }
    }

    tracing_log::LogTracer::init().map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(())
}

fn build_filter(default_level: &str) -> Result<EnvFilter, ConfigError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| {
            ConfigError::Logging(format!("Invalid log level '{}': {}", default_level, e))
        }),
    }
}
