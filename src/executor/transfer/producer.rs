//! Cursor producer: drains a scroll search into the record channel

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::connection::{SearchCluster, SearchTarget, ServerVersion};
use crate::error::{Result, TransferError};

use super::control::{StageControl, StageOutcome};
use super::cursor::{Cursor, ScrollPage};
use super::record::{TransferRecord, progress_percent};

/// What a producer reports when it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    /// Records handed to the channel.
    pub emitted: u64,
    /// Total announced by the source, if it announces one.
    pub total: u64,
}

/// Whether a producer keeps going after a channel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stopped,
}

/// Push one record, honoring directives before and during the send.
///
/// A pending directive is checked without blocking first, so a stop that
/// already arrived is seen before another record is handed off. A send
/// blocked on a full channel is abandoned as soon as a directive shows up.
pub(crate) async fn emit<T>(
    records: &mpsc::Sender<TransferRecord>,
    control: &mut StageControl<T>,
    record: TransferRecord,
) -> Flow {
    if let Some(directive) = control.poll() {
        debug!("Producer observed {:?} before send", directive);
        return Flow::Stopped;
    }

    tokio::select! {
        biased;
        directive = control.directive() => {
            debug!("Producer observed {:?} while blocked on send", directive);
            Flow::Stopped
        }
        sent = records.send(record) => match sent {
            Ok(()) => Flow::Continue,
            Err(_) => {
                // The sink is gone; the session will tell us to stop.
                debug!("Record channel closed, waiting for directive");
                control.directive().await;
                Flow::Stopped
            }
        }
    }
}

/// Parse query text given on the command line.
///
/// `None` means match everything.
pub fn parse_query(text: Option<&str>) -> Result<Value> {
    match text {
        None => Ok(json!({ "query": { "match_all": {} } })),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| TransferError::InvalidQuery(e.to_string()).into()),
    }
}

/// Build the body of the scroll-opening search.
///
/// The query must be a JSON object. `size` is always set; `_doc` ordering is
/// requested when the server has it and the query brings no sort of its own.
pub fn search_body(query: &Value, page_size: usize, version: ServerVersion) -> Result<Value> {
    let Value::Object(fields) = query else {
        return Err(TransferError::InvalidQuery(format!("expected a JSON object, got {query}")).into());
    };

    let mut body = fields.clone();
    body.insert("size".to_string(), json!(page_size));
    if version.supports_doc_sort() && !body.contains_key("sort") {
        body.insert("sort".to_string(), json!(["_doc"]));
    }
    Ok(Value::Object(body))
}

/// Streams every hit of a query, in cursor order, onto the record channel.
pub struct CursorProducer {
    cluster: Arc<dyn SearchCluster>,
    target: SearchTarget,
    query: Value,
    page_size: usize,
    ttl: String,
}

impl CursorProducer {
    pub fn new(
        cluster: Arc<dyn SearchCluster>,
        target: SearchTarget,
        query: Value,
        page_size: usize,
        ttl: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            target,
            query,
            page_size,
            ttl: ttl.into(),
        }
    }

    /// Run until the cursor is exhausted, a directive stops it, or it fails.
    ///
    /// The record sender is dropped before the outcome is reported.
    pub async fn run(
        self,
        records: mpsc::Sender<TransferRecord>,
        mut control: StageControl<ProducerReport>,
    ) {
        let mut report = ProducerReport::default();
        let result = self.stream(&records, &mut control, &mut report).await;
        drop(records);

        let outcome = match result {
            Ok(Flow::Continue) => StageOutcome::Completed(report),
            Ok(Flow::Stopped) => StageOutcome::Stopped(report),
            Err(e) => StageOutcome::Failed(e),
        };
        control.report(outcome);
    }

    async fn stream(
        &self,
        records: &mpsc::Sender<TransferRecord>,
        control: &mut StageControl<ProducerReport>,
        report: &mut ProducerReport,
    ) -> Result<Flow> {
        let version = self.cluster.version();
        let body = search_body(&self.query, self.page_size, version)?;

        let typed = version.has_mapping_types();

        let mut page = tokio::select! {
            biased;
            _ = control.directive() => return Ok(Flow::Stopped),
            opened = self.open(&body, version) => opened?,
        };
        report.total = page.total;
        info!("Scroll opened: {} hits in total", report.total);

        loop {
            if page.is_empty() {
                debug!("Empty page, cursor exhausted after {} records", report.emitted);
                return Ok(Flow::Continue);
            }

            let ScrollPage { cursor, hits, .. } = page;
            debug!("Page with {} hits", hits.len());
            for hit in hits {
                let percent = progress_percent(report.emitted + 1, report.total);
                let mut record = TransferRecord::from_hit(hit, percent)?;
                if !typed {
                    record.source_type.clear();
                }
                if emit(records, control, record).await == Flow::Stopped {
                    return Ok(Flow::Stopped);
                }
                report.emitted += 1;
            }

            page = tokio::select! {
                biased;
                _ = control.directive() => return Ok(Flow::Stopped),
                next = self.next_page(&cursor) => next?,
            };
        }
    }

    /// Open the scroll; 1.x servers need one continuation before hits flow.
    async fn open(&self, body: &Value, version: ServerVersion) -> Result<ScrollPage> {
        let response = self.cluster.open_scroll(&self.target, body, &self.ttl).await?;
        let first = ScrollPage::decode(response, &self.ttl)?;
        if !version.needs_priming_scroll() {
            return Ok(first);
        }

        debug!("Server {} needs a priming scroll request", version);
        let mut primed = self.next_page(&first.cursor).await?;
        primed.total = first.total;
        Ok(primed)
    }

    async fn next_page(&self, cursor: &Cursor) -> Result<ScrollPage> {
        let response = self.cluster.continue_scroll(&cursor.token, &cursor.ttl).await?;
        ScrollPage::decode(response, &cursor.ttl)
    }
}
