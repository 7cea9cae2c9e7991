//! Sink re-inserting records through bulk requests
//!
//! Shared by import (records read from a file) and copy (records streamed
//! from another index).

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, TransferError};

use super::encoder::{BatchEncoder, BulkSubmitter, FlushPolicy, bulk_action};
use super::progress::ProgressTracker;
use super::record::TransferRecord;
use super::sink::{RecordSink, SinkReport};

/// Where re-inserted records go.
///
/// A missing override falls back to the record's own index or type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destination {
    pub index: Option<String>,
    pub doc_type: Option<String>,
}

impl Destination {
    pub fn new(index: Option<String>, doc_type: Option<String>) -> Self {
        let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());
        Self {
            index: non_empty(index),
            doc_type: non_empty(doc_type),
        }
    }

    /// Resolve index and type for the `number`th record (1-based).
    fn resolve<'a>(&'a self, record: &'a TransferRecord, number: u64) -> Result<(&'a str, &'a str)> {
        let index = match self.index.as_deref() {
            Some(index) => index,
            None if !record.source_collection.is_empty() => &record.source_collection,
            None => return Err(TransferError::MissingIndex { record: number }.into()),
        };
        let doc_type = self.doc_type.as_deref().unwrap_or(&record.source_type);
        Ok((index, doc_type))
    }
}

/// Batches records into bulk requests against the destination.
pub struct BulkSink {
    encoder: BatchEncoder,
    submitter: BulkSubmitter,
    destination: Destination,
    progress: ProgressTracker,
    received: u64,
}

impl BulkSink {
    pub fn new(
        submitter: BulkSubmitter,
        policy: FlushPolicy,
        destination: Destination,
        progress: ProgressTracker,
    ) -> Self {
        Self {
            encoder: BatchEncoder::new(policy),
            submitter,
            destination,
            progress,
            received: 0,
        }
    }

    fn encode(&mut self, record: &TransferRecord) -> Result<bool> {
        let (index, doc_type) = self.destination.resolve(record, self.received)?;
        let action = bulk_action(index, doc_type, record.id.as_deref());
        let source: &Value = record.source().ok_or_else(|| TransferError::MissingSource {
            id: record.display_id().to_string(),
        })?;
        self.encoder.append(&action, source)
    }

    async fn flush(&mut self) -> Result<()> {
        if let Some(payload) = self.encoder.take() {
            self.submitter.submit(payload).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordSink for BulkSink {
    async fn accept(&mut self, record: TransferRecord) -> Result<()> {
        self.received += 1;
        if self.encode(&record)? {
            self.flush().await?;
        }
        self.progress.update(record.progress_percent);
        Ok(())
    }

    async fn complete(&mut self) -> Result<()> {
        self.flush().await?;
        self.progress.finish();
        let stats = self.submitter.stats();
        debug!(
            "Bulk sink complete: {} records in {} requests",
            stats.records, stats.requests
        );
        Ok(())
    }

    async fn abandon(&mut self) {
        self.progress.finish();
        let dropped = self.encoder.buffered_records();
        if dropped > 0 {
            debug!(
                "Discarding {} buffered records ({} bytes)",
                dropped,
                self.encoder.buffered_bytes()
            );
        }
        self.encoder.take();
    }

    async fn report(&self) -> SinkReport {
        let stats = self.submitter.stats();
        let artifact = self.submitter.artifact();
        SinkReport {
            written: stats.records,
            requests: stats.requests,
            failed_batches: stats.failed_batches,
            failed_items: stats.failed_items,
            error_artifact: artifact.is_populated().then(|| artifact.path().to_path_buf()),
            file_size_bytes: 0,
        }
    }
}
