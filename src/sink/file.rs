use super::{Sink, SinkError};
use crate::batch::LogBatch;
use chrono::{NaiveDate, Utc};
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    pub flush_interval: Duration,
    pub retained_files: usize,
    pub queue_capacity: usize,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_prefix: "log".to_string(),
            flush_interval: Duration::from_secs(2),
            retained_files: 7,
            queue_capacity: 1024,
        }
    }
}

/// Primary local sink: buffered appends to a daily-rolling file.
///
/// A single writer task owns the file handle, so concurrent producers only
/// ever contend on the queue. Writes are buffered and flushed on a fixed
/// interval, bounding loss on a crash to at most one interval; `close`
/// performs the mandatory final flush-and-sync.
pub struct RollingFileSink {
    tx: parking_lot::Mutex<Option<mpsc::Sender<LogBatch>>>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl RollingFileSink {
    pub fn new(config: FileSinkConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let worker = tokio::spawn(run_writer(config, rx));

        Self {
            tx: parking_lot::Mutex::new(Some(tx)),
            worker: parking_lot::Mutex::new(Some(worker)),
        }
    }
}

impl Sink for RollingFileSink {
    fn name(&self) -> &'static str {
        "rolling-file"
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
            // Dropping the sender lets the writer drain the queue and exit.
            self.tx.lock().take();
            let handle = self.worker.lock().take();
            if let Some(handle) = handle {
                handle.await.map_err(|e| SinkError::Worker(e.to_string()))?;
            }
            Ok(())
        })
    }
}

async fn run_writer(config: FileSinkConfig, mut rx: mpsc::Receiver<LogBatch>) {
    let mut writer = Writer {
        config,
        current: None,
    };
    let mut ticker = tokio::time::interval(writer.config.flush_interval);

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(batch) => {
                    if let Err(e) = writer.append(&batch).await {
                        error!("File sink write failed for batch {}: {e}", batch.id());
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if let Err(e) = writer.flush().await {
                    error!("File sink flush failed: {e}");
                }
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        error!("File sink failed to flush on shutdown: {e}");
    }
}

struct Writer {
    config: FileSinkConfig,
    current: Option<(NaiveDate, BufWriter<File>)>,
}

impl Writer {
    async fn append(&mut self, batch: &LogBatch) -> std::io::Result<()> {
        let today = Utc::now().date_naive();
        self.roll_to(today).await?;

        if let Some((_, file)) = self.current.as_mut() {
            file.write_all(batch.payload()).await?;
            if !batch.payload().ends_with(b"\n") {
                file.write_all(b"\n").await?;
            }
        }
        Ok(())
    }

    async fn roll_to(&mut self, date: NaiveDate) -> std::io::Result<()> {
        if matches!(&self.current, Some((current, _)) if *current == date) {
            return Ok(());
        }

        if let Some((old_date, mut old)) = self.current.take() {
            old.flush().await?;
            debug!("Rolled file sink from {old_date} to {date}");
        }

        fs::create_dir_all(&self.config.directory).await?;
        let path = self.config.directory.join(self.file_name(date));
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        self.current = Some((date, BufWriter::new(file)));

        self.prune().await;
        Ok(())
    }

    fn file_name(&self, date: NaiveDate) -> String {
        format!("{}-{}.log", self.config.file_prefix, date.format("%Y-%m-%d"))
    }

    /// Removes the oldest rolled files beyond the retained count. Names embed
    /// the date in sortable form, so lexicographic order is age order.
    async fn prune(&self) {
        let prefix = format!("{}-", self.config.file_prefix);

        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.config.directory).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("File sink retention scan failed: {e}");
                return;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(name) = entry.file_name().to_str()
                && name.starts_with(&prefix)
                && name.ends_with(".log")
            {
                names.push(name.to_string());
            }
        }

        if names.len() <= self.config.retained_files {
            return;
        }

        names.sort_unstable();
        let excess = names.len() - self.config.retained_files;
        for name in names.into_iter().take(excess) {
            let path = self.config.directory.join(&name);
            if let Err(e) = fs::remove_file(&path).await {
                warn!("File sink failed to remove {}: {e}", path.display());
            } else {
                debug!("File sink pruned {name}");
            }
        }
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        if let Some((_, file)) = self.current.as_mut() {
            file.flush().await?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        if let Some((_, mut buffered)) = self.current.take() {
            buffered.flush().await?;
            let file = buffered.into_inner();
            file.sync_all().await?;
        }
        Ok(())
    }
}
