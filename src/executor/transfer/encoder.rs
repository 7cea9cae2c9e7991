//! Bulk request assembly and submission
//!
//! The bulk wire format is line-delimited: one action line, then one
//! document line, per record. The encoder counts whole records, so a flush
//! never splits an action from its document.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::connection::SearchCluster;
use crate::error::Result;

/// Build an `index` action line for one document.
///
/// Empty type and missing id are left out of the metadata.
pub fn bulk_action(index: &str, doc_type: &str, id: Option<&str>) -> Value {
    let mut meta = Map::new();
    meta.insert("_index".to_string(), json!(index));
    if !doc_type.is_empty() {
        meta.insert("_type".to_string(), json!(doc_type));
    }
    if let Some(id) = id {
        meta.insert("_id".to_string(), json!(id));
    }
    json!({ "index": meta })
}

/// When a buffered batch has to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Send once the encoded body grows past this many bytes.
    pub max_bytes: usize,
    /// Also send once more than this many records are buffered.
    pub max_records: Option<usize>,
}

impl FlushPolicy {
    pub fn by_size(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            max_records: None,
        }
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }
}

/// A finished bulk body ready to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkPayload {
    pub body: String,
    pub records: usize,
}

/// Accumulates encoded action/document pairs.
#[derive(Debug)]
pub struct BatchEncoder {
    policy: FlushPolicy,
    buffer: String,
    records: usize,
}

impl BatchEncoder {
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            policy,
            buffer: String::new(),
            records: 0,
        }
    }

    /// Append one record. Returns true when the batch should be flushed.
    pub fn append(&mut self, action: &Value, document: &Value) -> Result<bool> {
        let action = serde_json::to_string(action)?;
        let document = serde_json::to_string(document)?;
        self.buffer.push_str(&action);
        self.buffer.push('\n');
        self.buffer.push_str(&document);
        self.buffer.push('\n');
        self.records += 1;
        Ok(self.should_flush())
    }

    fn should_flush(&self) -> bool {
        self.buffer.len() > self.policy.max_bytes
            || self.policy.max_records.is_some_and(|max| self.records > max)
    }

    /// Hand out the buffered batch and reset. `None` when nothing is buffered.
    pub fn take(&mut self) -> Option<BulkPayload> {
        if self.records == 0 {
            return None;
        }
        let payload = BulkPayload {
            body: std::mem::take(&mut self.buffer),
            records: self.records,
        };
        self.records = 0;
        Some(payload)
    }

    pub fn buffered_records(&self) -> usize {
        self.records
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }
}

/// Side file collecting the raw responses of failed bulk requests.
///
/// Created (truncating any previous run's file) on the first failure; each
/// failing response becomes one JSON line.
#[derive(Debug)]
pub struct ErrorArtifact {
    path: PathBuf,
    file: Option<File>,
}

impl ErrorArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether anything was written during this run.
    pub fn is_populated(&self) -> bool {
        self.file.is_some()
    }

    pub async fn record(&mut self, response: &Value) -> Result<()> {
        if self.file.is_none() {
            debug!("Creating error artifact {}", self.path.display());
            self.file = Some(File::create(&self.path).await?);
        }
        let mut line = serde_json::to_vec(response)?;
        line.push(b'\n');
        if let Some(file) = self.file.as_mut() {
            file.write_all(&line).await?;
            file.flush().await?;
        }
        Ok(())
    }
}

/// Outcome counters of the bulk requests sent so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitStats {
    pub requests: u64,
    pub records: u64,
    pub failed_batches: u64,
    pub failed_items: u64,
}

/// Sends bulk payloads and files away responses that report item errors.
pub struct BulkSubmitter {
    cluster: Arc<dyn SearchCluster>,
    artifact: ErrorArtifact,
    stats: SubmitStats,
}

impl BulkSubmitter {
    pub fn new(cluster: Arc<dyn SearchCluster>, artifact: ErrorArtifact) -> Self {
        Self {
            cluster,
            artifact,
            stats: SubmitStats::default(),
        }
    }

    /// Submit one batch.
    ///
    /// Transport and protocol errors are returned. A response reporting item
    /// errors is written to the error artifact and counted; only a failure to
    /// write that artifact is returned.
    pub async fn submit(&mut self, payload: BulkPayload) -> Result<()> {
        debug!(
            "Sending bulk request: {} records, {} bytes",
            payload.records,
            payload.body.len()
        );
        let response = self.cluster.bulk(payload.body).await?;
        self.stats.requests += 1;
        self.stats.records += payload.records as u64;

        if response.get("errors").and_then(Value::as_bool) == Some(false) {
            return Ok(());
        }

        let failed_items = count_failed_items(&response);
        warn!(
            "Bulk request reported errors ({} failed items), saving response to {}",
            failed_items,
            self.artifact.path().display()
        );
        self.stats.failed_batches += 1;
        self.stats.failed_items += failed_items;
        self.artifact.record(&response).await
    }

    pub fn stats(&self) -> SubmitStats {
        self.stats
    }

    pub fn artifact(&self) -> &ErrorArtifact {
        &self.artifact
    }
}

/// Items of a bulk response whose action result carries an `error`.
fn count_failed_items(response: &Value) -> u64 {
    response
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .filter(|item| item.values().any(|result| result.get("error").is_some()))
                .count() as u64
        })
        .unwrap_or(0)
}
