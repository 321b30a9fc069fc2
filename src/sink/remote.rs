use super::{Sink, SinkError};
use crate::batch::LogBatch;
use crate::sender::{PushRequest, Transport};
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Remote aggregator sink: a bounded queue in front of a worker that drives
/// the (interceptor-wrapped) transport.
///
/// `submit` never waits on the network; when the queue is full the batch is
/// rejected back to the caller instead of stalling producers. The failure
/// handling itself (classification, backup capture) lives in the transport
/// wrapper, not here.
pub struct RemoteSink {
    tx: parking_lot::Mutex<Option<mpsc::Sender<LogBatch>>>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl RemoteSink {
    pub fn new<T>(transport: T, queue_limit: usize) -> Self
    where
        T: Transport + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_limit);
        let worker = tokio::spawn(run_dispatcher(transport, rx));

        Self {
            tx: parking_lot::Mutex::new(Some(tx)),
            worker: parking_lot::Mutex::new(Some(worker)),
        }
    }
}

impl Sink for RemoteSink {
    fn name(&self) -> &'static str {
        "loki"
    }

    fn submit(&self, batch: LogBatch) -> Result<(), SinkError> {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.try_send(batch).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SinkError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
            }),
            None => Err(SinkError::Closed),
        }
    }

    fn close(&self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            // Dropping the sender lets the dispatcher drain in-flight batches.
            self.tx.lock().take();
            let handle = self.worker.lock().take();
            if let Some(handle) = handle {
                handle.await.map_err(|e| SinkError::Worker(e.to_string()))?;
            }
            Ok(())
        })
    }
}

async fn run_dispatcher<T: Transport>(transport: T, mut rx: mpsc::Receiver<LogBatch>) {
    while let Some(batch) = rx.recv().await {
        let request = PushRequest::from_batch(&batch);
        match transport.deliver(&request).await {
            Ok(response) if response.is_success() => {
                debug!(
                    "Batch {} delivered with HTTP {}",
                    batch.id(),
                    response.status
                );
            }
            Ok(response) => {
                // Already captured and reported by the delivery wrapper; the
                // sink only notes it for its own trace.
                warn!("Batch {} rejected with HTTP {}", batch.id(), response.status);
            }
            Err(fault) => {
                warn!("Batch {} delivery failed: {fault}", batch.id());
            }
        }
    }
}
