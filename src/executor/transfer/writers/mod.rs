//! Output file writers for exported records
//!
//! Two on-disk formats are supported:
//! - `ndjson`: one JSON document per line
//! - `array`: a single JSON array
//!
//! What is written for each record is chosen by [`Payload`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs::File;
use tokio::io::BufWriter;

use crate::error::{ConfigError, Result, TransferError};
use crate::executor::transfer::encoder::bulk_action;
use crate::executor::transfer::record::TransferRecord;

pub mod array;
pub mod ndjson;

pub use array::ArrayWriter;
pub use ndjson::NdjsonWriter;

/// On-disk layout of an export file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    NdJson,
    Array,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ndjson" | "jsonl" => Ok(OutputFormat::NdJson),
            "array" | "json" => Ok(OutputFormat::Array),
            other => Err(format!("unknown format '{other}', expected ndjson or array")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::NdJson => f.write_str("ndjson"),
            OutputFormat::Array => f.write_str("array"),
        }
    }
}

/// Part of a record written to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Payload {
    /// The whole search hit, metadata included.
    #[default]
    Hit,
    /// Only `_source`.
    Source,
    /// A bulk `index` action line followed by `_source` (ndjson only).
    BulkMeta,
}

impl Payload {
    /// Lines written for one record, in order.
    pub fn render<'a>(&self, record: &'a TransferRecord) -> Result<Vec<RenderedLine<'a>>> {
        match self {
            Payload::Hit => Ok(vec![RenderedLine::Borrowed(&record.content)]),
            Payload::Source => Ok(vec![RenderedLine::Borrowed(source_of(record)?)]),
            Payload::BulkMeta => {
                let source = source_of(record)?;
                let action = bulk_action(
                    &record.source_collection,
                    &record.source_type,
                    record.id.as_deref(),
                );
                Ok(vec![RenderedLine::Owned(action), RenderedLine::Borrowed(source)])
            }
        }
    }
}

/// A JSON value produced for output, either taken from the record or built.
#[derive(Debug)]
pub enum RenderedLine<'a> {
    Borrowed(&'a Value),
    Owned(Value),
}

impl RenderedLine<'_> {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let value = match self {
            RenderedLine::Borrowed(v) => *v,
            RenderedLine::Owned(v) => v,
        };
        Ok(serde_json::to_vec(value)?)
    }
}

fn source_of(record: &TransferRecord) -> Result<&Value> {
    record.source().ok_or_else(|| {
        TransferError::MissingSource {
            id: record.display_id().to_string(),
        }
        .into()
    })
}

/// Trait for writing records to an export file
#[async_trait]
pub trait RecordWriter: Send + Sync {
    /// Write one record
    async fn write_record(&mut self, record: &TransferRecord) -> Result<()>;

    /// Write footers and flush buffers
    async fn finalize(&mut self) -> Result<()>;

    /// Number of records written so far
    fn written(&self) -> u64;

    /// Current file size in bytes
    async fn file_size(&self) -> Result<u64>;
}

/// Open a writer for `path`, truncating an existing file.
///
/// # Arguments
/// * `path` - Output file path
/// * `format` - File layout
/// * `payload` - Part of each record to write
///
/// # Returns
/// * `Result<Box<dyn RecordWriter>>` - Writer or error
pub async fn open_writer(
    path: &Path,
    format: OutputFormat,
    payload: Payload,
) -> Result<Box<dyn RecordWriter>> {
    match format {
        OutputFormat::NdJson => Ok(Box::new(NdjsonWriter::create(path, payload).await?)),
        OutputFormat::Array if payload == Payload::BulkMeta => Err(ConfigError::Generic(
            "bulk metadata lines are only available with the ndjson format".to_string(),
        )
        .into()),
        OutputFormat::Array => Ok(Box::new(ArrayWriter::create(path, payload).await?)),
    }
}

/// Create a buffered file writer, truncating an existing file
pub(crate) async fn create_file(path: &Path) -> Result<BufWriter<File>> {
    validate_path(path)?;
    let file = File::create(path).await?;
    Ok(BufWriter::with_capacity(8 * 1024 * 1024, file)) // 8MB buffer
}

/// Check that the parent directory of `path` exists
pub(crate) fn validate_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Directory does not exist: {}", parent.display()),
            )
            .into());
        }
    }
    Ok(())
}
