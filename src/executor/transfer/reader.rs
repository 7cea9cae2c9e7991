//! Import reader: turns an export file back into transfer records
//!
//! Accepted elements, in either file format:
//! - hit-shaped documents carrying `_source` (and usually `_id`, `_index`)
//! - plain documents, indexed as they are
//!
//! Line-delimited files may also pair a bulk action line (`index` or
//! `create`) with the document on the following line.

use std::path::PathBuf;

use serde_json::{Map, Value};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Result, TransferError};

use super::control::{StageControl, StageOutcome};
use super::producer::{Flow, ProducerReport, emit};
use super::record::{TransferRecord, progress_percent};
use super::writers::OutputFormat;

/// Reads records from an import file.
pub struct FileReader {
    path: PathBuf,
    format: OutputFormat,
    id_field: Option<String>,
}

/// Metadata taken from a bulk action line.
#[derive(Debug, Default, PartialEq)]
struct ActionMeta {
    index: Option<String>,
    doc_type: Option<String>,
    id: Option<String>,
}

impl FileReader {
    pub fn new(path: impl Into<PathBuf>, format: OutputFormat, id_field: Option<String>) -> Self {
        Self {
            path: path.into(),
            format,
            id_field: id_field.filter(|f| !f.is_empty()),
        }
    }

    /// Run until the file is consumed, a directive stops it, or it fails.
    pub async fn run(
        self,
        records: mpsc::Sender<TransferRecord>,
        mut control: StageControl<ProducerReport>,
    ) {
        let mut report = ProducerReport::default();
        let result = match self.format {
            OutputFormat::NdJson => self.stream_lines(&records, &mut control, &mut report).await,
            OutputFormat::Array => self.stream_array(&records, &mut control, &mut report).await,
        };
        drop(records);

        let outcome = match result {
            Ok(Flow::Continue) => {
                info!("Read {} records from {}", report.emitted, self.path.display());
                StageOutcome::Completed(report)
            }
            Ok(Flow::Stopped) => StageOutcome::Stopped(report),
            Err(e) => StageOutcome::Failed(e),
        };
        control.report(outcome);
    }

    async fn stream_lines(
        &self,
        records: &mpsc::Sender<TransferRecord>,
        control: &mut StageControl<ProducerReport>,
        report: &mut ProducerReport,
    ) -> Result<Flow> {
        let file = File::open(&self.path).await?;
        let size = file.metadata().await?.len();
        let mut reader = BufReader::new(file);
        debug!("Reading ndjson import file {} ({} bytes)", self.path.display(), size);

        let mut consumed = 0u64;
        let mut pending: Option<ActionMeta> = None;
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader.read_line(&mut line).await?;
            if read == 0 {
                break;
            }
            consumed += read as u64;

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            let number = report.emitted + 1;
            let value: Value = serde_json::from_str(text).map_err(|e| {
                TransferError::InvalidRecord {
                    record: number,
                    message: e.to_string(),
                }
            })?;

            if pending.is_none() {
                if let Some(meta) = parse_action(&value) {
                    pending = Some(meta);
                    continue;
                }
            }

            let record = self.build_record(value, pending.take(), number, progress_percent(consumed, size))?;
            if emit(records, control, record).await == Flow::Stopped {
                return Ok(Flow::Stopped);
            }
            report.emitted = number;
        }

        if pending.is_some() {
            return Err(TransferError::InvalidRecord {
                record: report.emitted + 1,
                message: "action line without a document".to_string(),
            }
            .into());
        }
        report.total = report.emitted;
        Ok(Flow::Continue)
    }

    async fn stream_array(
        &self,
        records: &mpsc::Sender<TransferRecord>,
        control: &mut StageControl<ProducerReport>,
        report: &mut ProducerReport,
    ) -> Result<Flow> {
        let content = tokio::fs::read(&self.path).await?;
        let items = match serde_json::from_slice(&content) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                return Err(TransferError::InvalidRecord {
                    record: 1,
                    message: "expected a JSON array".to_string(),
                }
                .into());
            }
            Err(e) => {
                return Err(TransferError::InvalidRecord {
                    record: 1,
                    message: e.to_string(),
                }
                .into());
            }
        };

        report.total = items.len() as u64;
        debug!("Array import file {} holds {} records", self.path.display(), report.total);
        for (i, value) in items.into_iter().enumerate() {
            let number = i as u64 + 1;
            let record =
                self.build_record(value, None, number, progress_percent(number, report.total))?;
            if emit(records, control, record).await == Flow::Stopped {
                return Ok(Flow::Stopped);
            }
            report.emitted = number;
        }
        Ok(Flow::Continue)
    }

    /// Build the `number`th record from a decoded element.
    fn build_record(
        &self,
        value: Value,
        action: Option<ActionMeta>,
        number: u64,
        percent: u8,
    ) -> Result<TransferRecord> {
        let Value::Object(mut fields) = value else {
            return Err(TransferError::InvalidRecord {
                record: number,
                message: "not a JSON object".to_string(),
            }
            .into());
        };

        let meta = match action {
            Some(meta) => meta,
            None if is_hit(&fields) => {
                let meta = ActionMeta {
                    index: string_field(&fields, "_index"),
                    doc_type: string_field(&fields, "_type"),
                    id: string_field(&fields, "_id"),
                };
                if let Some(Value::Object(source)) = fields.remove("_source") {
                    fields = source;
                }
                meta
            }
            None => ActionMeta::default(),
        };

        let id = match (&meta.id, &self.id_field) {
            (Some(id), _) => Some(id.clone()),
            (None, Some(field)) => Some(id_from_field(&fields, field, number)?),
            (None, None) => None,
        };

        Ok(TransferRecord::from_source(
            id,
            meta.index,
            meta.doc_type,
            Value::Object(fields),
            percent,
        ))
    }
}

/// A bulk action line: exactly one `index` or `create` key holding an object.
fn parse_action(value: &Value) -> Option<ActionMeta> {
    let fields = value.as_object()?;
    if fields.len() != 1 {
        return None;
    }
    let (name, meta) = fields.iter().next()?;
    if name != "index" && name != "create" {
        return None;
    }
    let meta = meta.as_object()?;
    Some(ActionMeta {
        index: string_field(meta, "_index"),
        doc_type: string_field(meta, "_type"),
        id: string_field(meta, "_id"),
    })
}

fn is_hit(fields: &Map<String, Value>) -> bool {
    matches!(fields.get("_source"), Some(Value::Object(_)))
        && (fields.contains_key("_id") || fields.contains_key("_index"))
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Id taken from a document field; strings and numbers are accepted.
fn id_from_field(fields: &Map<String, Value>, field: &str, number: u64) -> Result<String> {
    match fields.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(TransferError::MissingIdField {
            field: field.to_string(),
            record: number,
        }
        .into()),
    }
}
