use super::outcome::{DeliveryOutcome, classify};
use super::transport::{PushRequest, PushResponse, Transport, TransportFault};
use crate::backup::BackupStore;
use crate::fallback::FallbackChannel;
use std::sync::Arc;
use tracing::debug;

/// Wraps a transport so failed deliveries become recoverable without altering
/// what the caller observes.
///
/// The contract is "observe, don't intercept": whatever the inner transport
/// returns (response or fault) is returned unchanged; classification, backup
/// capture and fallback diagnostics are strictly additive side effects. A
/// backup-write failure is itself only reported to the fallback channel, so
/// the recovery mechanism can never break the primary path.
#[derive(Clone)]
pub struct DeliveryGuard<T> {
    inner: T,
    backup: Arc<BackupStore>,
    fallback: Arc<dyn FallbackChannel>,
}

impl<T: Transport> DeliveryGuard<T> {
    pub fn new(inner: T, backup: Arc<BackupStore>, fallback: Arc<dyn FallbackChannel>) -> Self {
        Self {
            inner,
            backup,
            fallback,
        }
    }

    pub fn backup(&self) -> &BackupStore {
        &self.backup
    }

    async fn capture(&self, request: &PushRequest) {
        if let Err(e) = self.backup.capture(&request.payload).await {
            self.fallback.report(&format!(
                "backup capture failed for batch {}: {e}",
                request.batch_id
            ));
        }
    }
}

impl<T: Transport> Transport for DeliveryGuard<T> {
    async fn deliver(&self, request: &PushRequest) -> Result<PushResponse, TransportFault> {
        let result = self.inner.deliver(request).await;

        match classify(&result) {
            DeliveryOutcome::Success { status } => {
                debug!("Batch {} acknowledged with HTTP {status}", request.batch_id);
            }
            DeliveryOutcome::Rejected { status, body } => {
                self.fallback.report(&format!(
                    "push rejected for batch {}: HTTP {status} {body}",
                    request.batch_id
                ));
                self.capture(request).await;
            }
            DeliveryOutcome::TransportFailure { description } => {
                self.fallback.report(&format!(
                    "push failed for batch {}: {description}",
                    request.batch_id
                ));
                self.capture(request).await;
            }
        }

        result
    }
}

impl<T> std::fmt::Debug for DeliveryGuard<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryGuard")
            .field("inner", &self.inner)
            .field("backup", &self.backup)
            .finish_non_exhaustive()
    }
}
