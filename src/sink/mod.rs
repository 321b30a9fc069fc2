pub mod file;
pub mod remote;

pub use file::{FileSinkConfig, RollingFileSink};
pub use remote::RemoteSink;

use crate::batch::LogBatch;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink queue is full")]
    QueueFull,
    #[error("Sink is closed")]
    Closed,
    #[error("Sink worker failed: {0}")]
    Worker(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A destination that durably stores or forwards formatted batches.
///
/// `submit` must be non-blocking for the producer (enqueue only); all I/O
/// happens on the sink's own worker. `close` flushes and shuts the sink down
/// and is awaited exactly once at pipeline teardown.
pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;

    fn submit(&self, batch: LogBatch) -> Result<(), SinkError>;

    fn close(&self) -> BoxFuture<'_, Result<(), SinkError>>;
}

/// Dispatches each batch to every configured sink.
///
/// Sinks fail independently: a full queue or closed sink is reported and the
/// remaining sinks still receive the batch.
pub struct FanOut {
    sinks: Vec<Box<dyn Sink>>,
}

impl FanOut {
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self { sinks }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Hands the batch to every sink; returns how many accepted it.
    pub fn dispatch(&self, batch: &LogBatch) -> usize {
        let mut accepted = 0;
        for sink in &self.sinks {
            match sink.submit(batch.clone()) {
                Ok(()) => accepted += 1,
                Err(e) => {
                    warn!("Sink {} rejected batch {}: {e}", sink.name(), batch.id());
                }
            }
        }
        accepted
    }

    pub async fn close(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.close().await {
                warn!("Sink {} failed to close cleanly: {e}", sink.name());
            }
        }
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("FanOut").field("sinks", &names).finish()
    }
}
