//! Sink writing records to an export file

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;

use super::progress::ProgressTracker;
use super::record::TransferRecord;
use super::sink::{RecordSink, SinkReport};
use super::writers::RecordWriter;

/// Writes each record through a [`RecordWriter`] and drives the progress bar.
pub struct FileSink {
    writer: Box<dyn RecordWriter>,
    progress: ProgressTracker,
    finalized: bool,
}

impl FileSink {
    /// The writer's file is already open, so local I/O errors surface
    /// before any stage starts.
    pub fn new(writer: Box<dyn RecordWriter>, progress: ProgressTracker) -> Self {
        Self {
            writer,
            progress,
            finalized: false,
        }
    }
}

#[async_trait]
impl RecordSink for FileSink {
    async fn accept(&mut self, record: TransferRecord) -> Result<()> {
        self.writer.write_record(&record).await?;
        self.progress.update(record.progress_percent);
        Ok(())
    }

    async fn complete(&mut self) -> Result<()> {
        self.finalized = true;
        self.writer.finalize().await?;
        self.progress.finish();
        debug!("File sink complete: {} records", self.writer.written());
        Ok(())
    }

    async fn abandon(&mut self) {
        self.progress.finish();
        if self.finalized {
            return;
        }
        self.finalized = true;
        if let Err(e) = self.writer.finalize().await {
            warn!("Failed to finalize output file: {}", e);
        }
    }

    async fn report(&self) -> SinkReport {
        SinkReport {
            written: self.writer.written(),
            file_size_bytes: self.writer.file_size().await.unwrap_or(0),
            ..SinkReport::default()
        }
    }
}
