pub mod config;
pub mod logging;

pub use config::{Config, ConfigError, LogLevel};
pub use logging::LoggingError;

use crate::event::{Level, LogEvent};
use crate::pipeline::Pipeline;
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The relay application: a pipeline fed by stdin lines, torn down cleanly on
/// EOF, SIGINT or SIGTERM.
pub struct App {
    config: Config,
    pipeline: Arc<Pipeline>,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, Box<dyn std::error::Error + Send + Sync>>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args_and_env(args)?;
        Self::from_config(config)
    }

    pub fn from_config(
        config: Config,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        // A config file, when given, replaces the CLI/env configuration.
        let final_config = if let Some(config_file) = &config.config_file {
            Config::from_file(config_file)?
        } else {
            config
        };
        final_config.validate()?;

        if let Err(e) = logging::init(final_config.log_level) {
            // Already-installed subscribers (tests, embedders) are not fatal.
            eprintln!("loki-relay: {e}");
        }

        info!("Starting loki-relay v{}", env!("CARGO_PKG_VERSION"));
        info!(
            "Configuration: endpoint={}, batch_size={}, backup_path={}",
            final_config.endpoint,
            final_config.batch_size,
            final_config.backup_path.display()
        );

        let pipeline = Arc::new(Pipeline::build(&final_config)?);

        Ok(Self {
            config: final_config,
            pipeline,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline.clone()
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let cancel = CancellationToken::new();
        spawn_signal_listener(cancel.clone());

        info!("loki-relay is running; reading events from stdin (Ctrl+C to stop)");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                line = lines.next_line() => match line {
                    Ok(Some(text)) => {
                        if text.trim().is_empty() {
                            continue;
                        }
                        if let Err(e) = self.pipeline.publish(LogEvent::new(Level::Info, text)) {
                            warn!("Event not accepted: {e}");
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {e}");
                        break;
                    }
                }
            }
        }

        self.pipeline.shutdown().await;
        info!("loki-relay stopped.");
        Ok(())
    }
}

fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match unix_signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to create SIGTERM handler: {e}");
                    return;
                }
            };

            tokio::select! {
                result = signal::ctrl_c() => match result {
                    Ok(()) => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
                    Err(e) => {
                        error!("Failed to listen for SIGINT: {e}");
                        return;
                    }
                },
                _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            }
        }

        #[cfg(not(unix))]
        {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
                Err(e) => {
                    error!("Failed to listen for SIGINT: {e}");
                    return;
                }
            }
        }

        cancel.cancel();
    });
}

// Main entry point for the binary
pub async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    let args: Vec<String> = std::env::args().collect();

    // Handle version flag specially
    if args.len() > 1 && (args[1] == "--version" || args[1] == "-V") {
        println!("loki-relay {}", crate::VERSION);
        return Ok(());
    }

    // Handle help flag
    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        Config::parse_from(["loki-relay", "--help"]);
        return Ok(());
    }

    match App::from_args(args) {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("Application error: {e}");
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("loki-relay: {e}");
            process::exit(2);
        }
    }

    Ok(())
}
