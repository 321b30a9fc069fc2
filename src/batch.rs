use crate::event::LabelSet;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// An immutable, already-serialized batch of log events plus the label set
/// identifying its destination stream.
///
/// Cloning is cheap (`Bytes` + `Arc`), which is what lets the fan-out hand the
/// same batch to every sink without copying the payload.
#[derive(Debug, Clone)]
pub struct LogBatch {
    id: String,
    labels: Arc<LabelSet>,
    payload: Bytes,
    created_at: Instant,
}

impl LogBatch {
    pub fn new(labels: Arc<LabelSet>, payload: Bytes) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            labels,
            payload,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}
