//! In-memory cluster and helpers for pipeline tests

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use crate::connection::{SearchCluster, SearchTarget, ServerVersion};
use crate::error::{Result, TransportError};
use crate::executor::transfer::control::{StageControl, stage_ports};
use crate::executor::transfer::record::TransferRecord;
use crate::executor::transfer::writers::RecordWriter;

/// How the fake answers bulk requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkReply {
    Ok,
    /// `errors: true` with every item failed.
    ItemErrors,
    /// Connection refused.
    Unreachable,
}

/// Serves `docs` through the scroll protocol and records bulk bodies.
///
/// The scroll id is the index of the next page to serve.
pub struct FakeCluster {
    docs: Vec<Value>,
    version: ServerVersion,
    omit_scroll_id: bool,
    stall_open: bool,
    bulk_reply: BulkReply,
    page_size: AtomicUsize,
    served: AtomicU64,
    bulk_bodies: Mutex<Vec<String>>,
    stored: Mutex<BTreeMap<String, Value>>,
}

impl FakeCluster {
    /// `count` hits in index `src`, ids `0..count`, sources `{"n": i}`.
    pub fn with_docs(count: u64) -> Self {
        let docs = (0..count)
            .map(|i| json!({ "_index": "src", "_id": i.to_string(), "_score": 1.0, "_source": { "n": i } }))
            .collect();
        Self::from_hits(docs)
    }

    /// Serves the given hits as they are.
    pub fn from_hits(docs: Vec<Value>) -> Self {
        Self {
            docs,
            version: ServerVersion::new(7, 10, 2),
            omit_scroll_id: false,
            stall_open: false,
            bulk_reply: BulkReply::Ok,
            page_size: AtomicUsize::new(10),
            served: AtomicU64::new(0),
            bulk_bodies: Mutex::new(Vec::new()),
            stored: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn version(mut self, version: ServerVersion) -> Self {
        self.version = version;
        self
    }

    /// Every hit carries this `_type`.
    pub fn doc_type(mut self, doc_type: &str) -> Self {
        for doc in &mut self.docs {
            doc["_type"] = json!(doc_type);
        }
        self
    }

    /// Opening the scroll never answers.
    pub fn stall_open(mut self) -> Self {
        self.stall_open = true;
        self
    }

    pub fn without_scroll_id(mut self) -> Self {
        self.omit_scroll_id = true;
        self
    }

    pub fn bulk_reply(mut self, reply: BulkReply) -> Self {
        self.bulk_reply = reply;
        self
    }

    pub fn docs(&self) -> &[Value] {
        &self.docs
    }

    /// Hits handed out so far.
    pub fn served_hits(&self) -> u64 {
        self.served.load(Ordering::SeqCst)
    }

    pub fn bulk_bodies(&self) -> Vec<String> {
        self.bulk_bodies.lock().unwrap().clone()
    }

    fn page(&self, page: usize, hits: Vec<Value>) -> Value {
        self.served.fetch_add(hits.len() as u64, Ordering::SeqCst);
        let total = if self.version.major >= 7 {
            json!({ "value": self.docs.len(), "relation": "eq" })
        } else {
            json!(self.docs.len())
        };
        let mut response = json!({ "took": 1, "hits": { "total": total, "hits": hits } });
        if !self.omit_scroll_id {
            response["_scroll_id"] = json!(page.to_string());
        }
        response
    }

    fn serve(&self, page: usize) -> Value {
        let size = self.page_size.load(Ordering::SeqCst).max(1);
        let start = page.saturating_mul(size).min(self.docs.len());
        let end = (start + size).min(self.docs.len());
        self.page(page + 1, self.docs[start..end].to_vec())
    }
}

#[async_trait]
impl SearchCluster for FakeCluster {
    fn version(&self) -> ServerVersion {
        self.version
    }

    async fn open_scroll(&self, _target: &SearchTarget, query: &Value, _ttl: &str) -> Result<Value> {
        if self.stall_open {
            std::future::pending::<()>().await;
        }
        let size = query.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        self.page_size.store(size, Ordering::SeqCst);
        if self.version.needs_priming_scroll() {
            return Ok(self.page(0, Vec::new()));
        }
        Ok(self.serve(0))
    }

    async fn continue_scroll(&self, scroll_id: &str, _ttl: &str) -> Result<Value> {
        let page = scroll_id.parse::<usize>().unwrap_or(usize::MAX / 2);
        Ok(self.serve(page))
    }

    async fn bulk(&self, body: String) -> Result<Value> {
        let records = parse_bulk(&body).len();
        self.bulk_bodies.lock().unwrap().push(body);
        match self.bulk_reply {
            BulkReply::Ok => Ok(json!({
                "took": 1,
                "errors": false,
                "items": vec![json!({ "index": { "status": 201 } }); records]
            })),
            BulkReply::ItemErrors => Ok(json!({
                "took": 1,
                "errors": true,
                "items": vec![json!({ "index": {
                    "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": "failed to parse" }
                } }); records]
            })),
            BulkReply::Unreachable => Err(TransportError::RequestFailed {
                url: "http://fake:9200/_bulk".to_string(),
                message: "connection refused".to_string(),
            }
            .into()),
        }
    }

    async fn get_document(&self, index: &str, _doc_type: &str, id: &str) -> Result<Value> {
        let stored = self.stored.lock().unwrap();
        Ok(match stored.get(&format!("{index}/{id}")) {
            Some(source) => json!({ "_index": index, "_id": id, "found": true, "_source": source }),
            None => json!({ "_index": index, "_id": id, "found": false }),
        })
    }

    async fn put_document(
        &self,
        index: &str,
        _doc_type: &str,
        id: Option<&str>,
        body: &Value,
    ) -> Result<Value> {
        let mut stored = self.stored.lock().unwrap();
        let id = id.map(str::to_owned).unwrap_or_else(|| format!("auto-{}", stored.len() + 1));
        let previous = stored.insert(format!("{index}/{id}"), body.clone());
        let result = if previous.is_some() { "updated" } else { "created" };
        Ok(json!({ "_index": index, "_id": id, "result": result }))
    }

    async fn delete_document(&self, index: &str, _doc_type: &str, id: &str) -> Result<Value> {
        let removed = self.stored.lock().unwrap().remove(&format!("{index}/{id}"));
        let result = if removed.is_some() { "deleted" } else { "not_found" };
        Ok(json!({ "_index": index, "_id": id, "result": result }))
    }
}

/// Split a bulk body into (action, document) pairs.
pub fn parse_bulk(body: &str) -> Vec<(Value, Value)> {
    let lines: Vec<Value> = body
        .lines()
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len() % 2, 0, "bulk body split an action from its document");
    lines
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}

/// Writer that fails on its `fail_at`th record, optionally passing the
/// records before it to a real writer.
pub struct FailingWriter {
    fail_at: u64,
    written: u64,
    inner: Option<Box<dyn RecordWriter>>,
}

impl FailingWriter {
    pub fn new(fail_at: u64) -> Self {
        Self { fail_at, written: 0, inner: None }
    }

    pub fn wrapping(inner: Box<dyn RecordWriter>, fail_at: u64) -> Self {
        Self { fail_at, written: 0, inner: Some(inner) }
    }
}

#[async_trait]
impl RecordWriter for FailingWriter {
    async fn write_record(&mut self, record: &TransferRecord) -> Result<()> {
        if self.written + 1 == self.fail_at {
            return Err(std::io::Error::other("disk full").into());
        }
        if let Some(inner) = &mut self.inner {
            inner.write_record(record).await?;
        }
        self.written += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        match &mut self.inner {
            Some(inner) => inner.finalize().await,
            None => Ok(()),
        }
    }

    fn written(&self) -> u64 {
        self.written
    }

    async fn file_size(&self) -> Result<u64> {
        match &self.inner {
            Some(inner) => inner.file_size().await,
            None => Ok(0),
        }
    }
}

/// Runs `stage` behind its own control ports, passing directives through
/// and sending the kind of its outcome to `seen` before re-reporting it.
pub async fn relay_outcome<T, F, Fut>(
    mut control: StageControl<T>,
    seen: oneshot::Sender<&'static str>,
    stage: F,
) where
    F: FnOnce(StageControl<T>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (mut handle, inner) = stage_ports("relayed");
    tokio::spawn(stage(inner));

    let outcome = loop {
        tokio::select! {
            biased;
            outcome = handle.outcome() => break outcome,
            directive = control.directive() => handle.send(directive),
        }
    };
    let _ = seen.send(outcome.kind());
    control.report(outcome);
}
