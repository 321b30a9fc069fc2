use crate::event::LabelSet;
use crate::sender::TransportConfig;
use crate::sink::FileSinkConfig;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Argument error: {0}")]
    ArgError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("label `{s}` must be key=value"))?;
    if key.is_empty() {
        return Err(format!("label `{s}` has an empty key"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about = "Relay log events to a rolling file and Grafana Loki, with backup capture of failed pushes", long_about = None)]
#[serde(default)]
pub struct Config {
    /// Loki base endpoint URL (the push path is appended automatically)
    #[arg(long, env = "LOKI_ENDPOINT", default_value = "http://localhost:3100")]
    pub endpoint: String,

    /// Static stream labels as key=value (repeatable, or comma-separated in env)
    #[arg(
        long = "label",
        env = "LOKI_LABELS",
        value_parser = parse_label,
        value_delimiter = ',',
        default_value = "app=my-app"
    )]
    pub labels: Vec<(String, String)>,

    /// Number of events per push batch
    #[arg(long, env = "BATCH_SIZE", default_value = "50")]
    pub batch_size: usize,

    /// Upper bound on queued events and queued batches per sink
    #[arg(long, env = "QUEUE_LIMIT", default_value = "1000")]
    pub queue_limit: usize,

    /// Flush interval in milliseconds (batch sealing and file sink flushing)
    #[arg(long, env = "FLUSH_INTERVAL_MS", default_value = "2000")]
    pub flush_interval_ms: u64,

    /// Directory for the primary rolling file sink
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// File name prefix for the rolling file sink (log -> log-YYYY-MM-DD.log)
    #[arg(long, env = "FILE_PREFIX", default_value = "log")]
    pub file_prefix: String,

    /// How many rolled files to retain
    #[arg(long, env = "RETAINED_FILES", default_value = "7")]
    pub retained_files: usize,

    /// Backup file for batches that failed remote delivery
    #[arg(long, env = "BACKUP_PATH", default_value = "logs/loki_backup.log")]
    pub backup_path: PathBuf,

    /// HTTP request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value = "10")]
    pub connect_timeout_secs: u64,

    /// Log level for the relay's own diagnostics
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Configuration file path (optional)
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3100".to_string(),
            labels: vec![("app".to_string(), "my-app".to_string())],
            batch_size: 50,
            queue_limit: 1000,
            flush_interval_ms: 2000,
            log_dir: PathBuf::from("logs"),
            file_prefix: "log".to_string(),
            retained_files: 7,
            backup_path: PathBuf::from("logs/loki_backup.log"),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            log_level: LogLevel::Info,
            config_file: None,
        }
    }
}

impl Config {
    pub fn from_args_and_env<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|e| ConfigError::ArgError(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let _: Url = self
            .endpoint
            .parse()
            .map_err(|e| ConfigError::InvalidUrl(format!("endpoint `{}`: {e}", self.endpoint)))?;

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.queue_limit < self.batch_size {
            return Err(ConfigError::InvalidConfig(format!(
                "queue_limit ({}) must not be below batch_size ({})",
                self.queue_limit, self.batch_size
            )));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "flush_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.retained_files == 0 {
            return Err(ConfigError::InvalidConfig(
                "retained_files must be at least 1".to_string(),
            ));
        }
        if self.labels.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "at least one label is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// The configured labels, with a `host` label filled in from the machine
    /// hostname when not set explicitly.
    pub fn label_set(&self) -> LabelSet {
        let mut labels = LabelSet::from_pairs(self.labels.iter().cloned());
        if !labels.contains_key("host")
            && let Ok(host) = hostname::get()
        {
            labels.insert("host", host.to_string_lossy());
        }
        labels
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..Default::default()
        }
    }

    pub fn file_sink_config(&self) -> FileSinkConfig {
        FileSinkConfig {
            directory: self.log_dir.clone(),
            file_prefix: self.file_prefix.clone(),
            flush_interval: self.flush_interval(),
            retained_files: self.retained_files,
            queue_capacity: self.queue_limit,
        }
    }
}
