use crate::app::Config;
use crate::backup::BackupStore;
use crate::batch::LogBatch;
use crate::encode::LokiEncoder;
use crate::event::{LabelSet, LogEvent};
use crate::fallback::{FallbackChannel, StderrFallback};
use crate::sender::{DeliveryGuard, DeliveryStats, HttpTransport, StatsSnapshot, TransportFault};
use crate::sink::{FanOut, RemoteSink, RollingFileSink, Sink};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Transport setup failed: {0}")]
    Transport(#[from] TransportFault),
    #[error("Pipeline queue is full")]
    QueueFull,
    #[error("Pipeline is closed")]
    Closed,
}

/// The pipeline object: one per process, constructed after configuration is
/// loaded and torn down exactly once at shutdown.
///
/// Producers call [`publish`](Self::publish) from any task; a batcher worker
/// seals batches at the size threshold or on the flush tick, encodes them, and
/// hands each to the fan-out (rolling file + interceptor-wrapped remote).
/// There is no implicit global instance; holders share it by `Arc`.
pub struct Pipeline {
    tx: parking_lot::Mutex<Option<mpsc::Sender<LogEvent>>>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
    fanout: Arc<FanOut>,
    fallback: Arc<dyn FallbackChannel>,
    stats: Arc<DeliveryStats>,
}

impl Pipeline {
    pub fn build(config: &Config) -> Result<Self, PipelineError> {
        Self::build_with_fallback(config, Arc::new(StderrFallback))
    }

    pub fn build_with_fallback(
        config: &Config,
        fallback: Arc<dyn FallbackChannel>,
    ) -> Result<Self, PipelineError> {
        let label_set = config.label_set();
        let labels = Arc::new(label_set.clone());

        let backup = Arc::new(BackupStore::new(&config.backup_path));
        let transport = HttpTransport::new(config.transport_config(), fallback.clone())?;
        let stats = transport.stats();
        let guarded = DeliveryGuard::new(transport, backup, fallback.clone());

        let remote = RemoteSink::new(guarded, config.queue_limit);
        let file = RollingFileSink::new(config.file_sink_config());
        let fanout = Arc::new(FanOut::new(vec![
            Box::new(file) as Box<dyn Sink>,
            Box::new(remote) as Box<dyn Sink>,
        ]));

        let encoder = LokiEncoder::new(config.label_set());
        let (tx, rx) = mpsc::channel(config.queue_limit);
        let worker = tokio::spawn(run_batcher(
            encoder,
            labels,
            fanout.clone(),
            rx,
            config.batch_size,
            config.flush_interval(),
        ));

        info!(
            "Pipeline started: endpoint={}, batch_size={}, queue_limit={}",
            config.endpoint, config.batch_size, config.queue_limit
        );

        Ok(Self {
            tx: parking_lot::Mutex::new(Some(tx)),
            worker: parking_lot::Mutex::new(Some(worker)),
            fanout,
            fallback,
            stats,
        })
    }

    /// Enqueues one event. Never blocks and never fails because of remote
    /// delivery trouble; the only errors are a full queue or a closed
    /// pipeline, both local conditions.
    pub fn publish(&self, event: LogEvent) -> Result<(), PipelineError> {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.try_send(event).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    self.fallback
                        .report("event dropped: pipeline queue is full");
                    PipelineError::QueueFull
                }
                mpsc::error::TrySendError::Closed(_) => PipelineError::Closed,
            }),
            None => Err(PipelineError::Closed),
        }
    }

    pub fn delivery_stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Seals any pending partial batch, drains the sinks and performs the
    /// final flush-and-close. Idempotent; later calls are no-ops.
    pub async fn shutdown(&self) {
        self.tx.lock().take();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Batcher worker failed during shutdown: {e}");
            }
            self.fanout.close().await;

            let stats = self.stats.snapshot();
            info!(
                "Pipeline stopped: {} pushes, {} ok, {} failed",
                stats.total_requests, stats.successful_requests, stats.failed_requests
            );
        }
    }
}

async fn run_batcher(
    encoder: LokiEncoder,
    labels: Arc<LabelSet>,
    fanout: Arc<FanOut>,
    mut rx: mpsc::Receiver<LogEvent>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut pending: Vec<LogEvent> = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(flush_interval);

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(event) => {
                    pending.push(event);
                    if pending.len() >= batch_size {
                        seal(&encoder, &labels, &fanout, &mut pending);
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !pending.is_empty() {
                    seal(&encoder, &labels, &fanout, &mut pending);
                }
            }
        }
    }

    // Final seal so shutdown never strands a partial batch.
    if !pending.is_empty() {
        seal(&encoder, &labels, &fanout, &mut pending);
    }
}

fn seal(
    encoder: &LokiEncoder,
    labels: &Arc<LabelSet>,
    fanout: &Arc<FanOut>,
    pending: &mut Vec<LogEvent>,
) {
    let events = std::mem::take(pending);
    let event_count = events.len();

    match encoder.encode(&events) {
        Ok(payload) => {
            let batch = LogBatch::new(labels.clone(), payload);
            let accepted = fanout.dispatch(&batch);
            debug!(
                "Sealed batch {} ({event_count} events) to {accepted}/{} sinks",
                batch.id(),
                fanout.sink_count()
            );
        }
        Err(e) => {
            // Unreachable for a non-empty slice, but never worth a panic.
            error!("Batch encoding failed for {event_count} events: {e}");
        }
    }
}
