use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Append-only store for batches that failed remote delivery.
///
/// Each capture appends one `"<UTC RFC3339>: <payload>"` line to a dedicated
/// local file, kept separate from the primary rolling file. Records are never
/// mutated or deleted here; replaying them is an out-of-band recovery concern.
///
/// Appends from concurrent in-flight deliveries serialize behind the mutex
/// that owns the open file handle, so each record lands as one contiguous
/// write and records never interleave.
#[derive(Debug)]
pub struct BackupStore {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl BackupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one timestamped record containing `payload`.
    ///
    /// An empty payload is a no-op: there is nothing useful to recover, and
    /// the file is not even created for it.
    pub async fn capture(&self, payload: &[u8]) -> Result<(), BackupError> {
        if payload.is_empty() {
            return Ok(());
        }

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut record = Vec::with_capacity(timestamp.len() + payload.len() + 3);
        record.extend_from_slice(timestamp.as_bytes());
        record.extend_from_slice(b": ");
        record.extend_from_slice(payload);
        if !payload.ends_with(b"\n") {
            record.push(b'\n');
        }

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).await?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(file);
        }

        let result = match guard.as_mut() {
            Some(file) => async {
                file.write_all(&record).await?;
                file.flush().await?;
                Ok(())
            }
            .await,
            None => Ok(()),
        };

        // A failed handle may be unusable; drop it so the next capture reopens.
        if result.is_err() {
            *guard = None;
        }

        result.map_err(BackupError::IoError)
    }
}
