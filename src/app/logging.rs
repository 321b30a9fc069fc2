use super::config::LogLevel;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    Init(String),
}

/// Installs the global tracing subscriber for the relay's own diagnostics.
/// `RUST_LOG` wins over the configured level when set.
pub fn init(level: LogLevel) -> Result<(), LoggingError> {
    let default_directive = tracing::Level::from(level).to_string();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}
