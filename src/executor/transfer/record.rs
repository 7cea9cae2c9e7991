//! Records moving through the transfer pipeline

use serde_json::{Map, Value};

use crate::error::{ProtocolError, Result};

/// A schemaless document tree (object/array/string/number/bool/null).
pub type Document = Value;

/// One document in flight between a producer and a sink.
///
/// `content` is hit-shaped: `{"_index", "_type", "_id", "_source", ...}`.
/// Ownership moves with the record when it is pushed onto the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    /// Document id; `None` lets the destination assign one.
    pub id: Option<String>,
    /// Collection (index) the record came from; may be empty on import.
    pub source_collection: String,
    /// Document type the record came from; empty when the server has none.
    pub source_type: String,
    /// The full hit.
    pub content: Document,
    /// Share of the whole result set delivered so far, 0..=100.
    pub progress_percent: u8,
}

impl TransferRecord {
    /// Decode a search hit.
    pub fn from_hit(hit: Document, progress_percent: u8) -> Result<Self> {
        let id = required_str(&hit, "_id")?;
        let source_collection = required_str(&hit, "_index")?;
        let source_type = hit
            .get("_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            id: Some(id),
            source_collection,
            source_type,
            content: hit,
            progress_percent,
        })
    }

    /// Wrap a bare document body into a hit-shaped record.
    pub fn from_source(
        id: Option<String>,
        collection: Option<String>,
        doc_type: Option<String>,
        source: Document,
        progress_percent: u8,
    ) -> Self {
        let collection = collection.unwrap_or_default();
        let doc_type = doc_type.unwrap_or_default();

        let mut hit = Map::new();
        hit.insert("_index".to_string(), Value::String(collection.clone()));
        if !doc_type.is_empty() {
            hit.insert("_type".to_string(), Value::String(doc_type.clone()));
        }
        if let Some(id) = &id {
            hit.insert("_id".to_string(), Value::String(id.clone()));
        }
        hit.insert("_source".to_string(), source);

        Self {
            id,
            source_collection: collection,
            source_type: doc_type,
            content: Value::Object(hit),
            progress_percent,
        }
    }

    /// The `_source` sub-object, if the record carries one.
    pub fn source(&self) -> Option<&Document> {
        self.content.get("_source").filter(|s| s.is_object())
    }

    /// Id for log and error messages.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<auto>")
    }
}

fn required_str(hit: &Value, field: &str) -> Result<String> {
    hit.get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ProtocolError::MalformedHit(format!("hit without '{field}'")).into())
}

/// Percentage of `total` covered by `count`, clamped to 100.
///
/// An empty or shrinking result set reports 100 rather than dividing by zero.
pub fn progress_percent(count: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = count.saturating_mul(100) / total;
    pct.min(100) as u8
}
