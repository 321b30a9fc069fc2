use crate::event::{LabelSet, LogEvent};
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Batch is empty")]
    EmptyBatch,
}

#[derive(Serialize)]
struct PushEnvelope<'a> {
    streams: [Stream<'a>; 1],
}

#[derive(Serialize)]
struct Stream<'a> {
    stream: &'a BTreeMap<String, String>,
    values: Vec<[String; 2]>,
}

#[derive(Serialize)]
struct LineRecord<'a> {
    level: &'a str,
    message: &'a str,
}

/// Serializes a slice of events into the Loki push JSON envelope:
/// `{"streams":[{"stream":{..labels..},"values":[["<ns>","<line>"],..]}]}`.
///
/// One encoder is built per pipeline with the configured static label set;
/// every batch it produces belongs to that one stream.
#[derive(Debug, Clone)]
pub struct LokiEncoder {
    labels: LabelSet,
}

impl LokiEncoder {
    pub fn new(labels: LabelSet) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn encode(&self, events: &[LogEvent]) -> Result<Bytes, EncodeError> {
        if events.is_empty() {
            return Err(EncodeError::EmptyBatch);
        }

        let mut values = Vec::with_capacity(events.len());
        for event in events {
            let line = serde_json::to_string(&LineRecord {
                level: &event.level.to_string(),
                message: &event.message,
            })?;
            let nanos = event.timestamp.timestamp_nanos_opt().unwrap_or(0);
            values.push([nanos.to_string(), line]);
        }

        let envelope = PushEnvelope {
            streams: [Stream {
                stream: self.labels.as_map(),
                values,
            }],
        };

        let mut payload = serde_json::to_vec(&envelope)?;
        payload.push(b'\n');
        Ok(Bytes::from(payload))
    }
}
