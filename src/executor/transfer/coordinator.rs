//! Transfer coordinator for the three transfer modes
//!
//! - export: scroll search -> file
//! - import: file -> bulk requests
//! - copy: scroll search -> bulk requests into another index
//!
//! Each mode opens its local resources first, so a file that cannot be
//! created or read fails the command before any stage is started.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::TransferConfig;
use crate::connection::{SearchCluster, SearchTarget};
use crate::error::Result;

use super::bulk_sink::{BulkSink, Destination};
use super::encoder::{BulkSubmitter, ErrorArtifact, FlushPolicy};
use super::file_sink::FileSink;
use super::producer::CursorProducer;
use super::progress::ProgressTracker;
use super::reader::FileReader;
use super::session::{Session, TransferSummary};
use super::sink::run_sink;
use super::writers::{OutputFormat, Payload, open_writer};

/// Export request
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub source: SearchTarget,
    pub query: Value,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub payload: Payload,
}

/// Import request
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub input: PathBuf,
    pub format: OutputFormat,
    pub id_field: Option<String>,
    pub destination: Destination,
    /// Overrides the default error artifact location
    pub errors: Option<PathBuf>,
}

/// Copy request
#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub source: SearchTarget,
    pub query: Value,
    pub destination: Destination,
    /// Overrides the default error artifact location
    pub errors: Option<PathBuf>,
}

/// Coordinator for transfer operations
///
/// Builds the producer and sink for a mode and runs them as one session.
pub struct TransferCoordinator {
    cluster: Arc<dyn SearchCluster>,
    settings: TransferConfig,
    show_progress: bool,
    cancel_token: Option<CancellationToken>,
}

impl TransferCoordinator {
    pub fn new(cluster: Arc<dyn SearchCluster>, settings: TransferConfig) -> Self {
        Self {
            cluster,
            settings,
            show_progress: false,
            cancel_token: None,
        }
    }

    /// Enable or disable the progress bar
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Set cancellation token for the operations of this coordinator
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Export the hits of a query to a file
    pub async fn export(&self, options: ExportOptions) -> Result<TransferSummary> {
        info!("Exporting to {} ({})", options.output.display(), options.format);
        let writer = open_writer(&options.output, options.format, options.payload).await?;
        let sink = FileSink::new(writer, self.tracker("export"));
        let producer = self.producer(options.source, options.query);

        self.run(Session::start(
            self.settings.channel_capacity,
            |tx, control| producer.run(tx, control),
            |rx, control| run_sink(sink, rx, control),
        ))
        .await
    }

    /// Import an export file through bulk requests
    pub async fn import(&self, options: ImportOptions) -> Result<TransferSummary> {
        info!("Importing {} ({})", options.input.display(), options.format);
        tokio::fs::metadata(&options.input).await?;

        let artifact_path = options
            .errors
            .unwrap_or_else(|| import_artifact_path(&options.input));
        let reader = FileReader::new(options.input, options.format, options.id_field);
        let sink = self.bulk_sink(
            FlushPolicy::by_size(self.settings.max_request_bytes),
            options.destination,
            artifact_path,
            "import",
        );

        self.run(Session::start(
            self.settings.channel_capacity,
            |tx, control| reader.run(tx, control),
            |rx, control| run_sink(sink, rx, control),
        ))
        .await
    }

    /// Copy the hits of a query into another index
    pub async fn copy(&self, options: CopyOptions) -> Result<TransferSummary> {
        let artifact_path = options
            .errors
            .unwrap_or_else(|| copy_artifact_path(&options.source, &options.destination));
        info!(
            "Copying {} into {}",
            options.source.index.as_deref().unwrap_or("all indices"),
            options.destination.index.as_deref().unwrap_or("source indices")
        );

        let sink = self.bulk_sink(
            FlushPolicy::by_size(self.settings.max_request_bytes)
                .with_max_records(self.settings.copy_batch_records),
            options.destination,
            artifact_path,
            "copy",
        );
        let producer = self.producer(options.source, options.query);

        self.run(Session::start(
            self.settings.channel_capacity,
            |tx, control| producer.run(tx, control),
            |rx, control| run_sink(sink, rx, control),
        ))
        .await
    }

    fn producer(&self, source: SearchTarget, query: Value) -> CursorProducer {
        CursorProducer::new(
            self.cluster.clone(),
            source,
            query,
            self.settings.page_size,
            self.settings.scroll_ttl.clone(),
        )
    }

    fn bulk_sink(
        &self,
        policy: FlushPolicy,
        destination: Destination,
        artifact: PathBuf,
        label: &str,
    ) -> BulkSink {
        let submitter = BulkSubmitter::new(self.cluster.clone(), ErrorArtifact::new(artifact));
        BulkSink::new(submitter, policy, destination, self.tracker(label))
    }

    fn tracker(&self, label: &str) -> ProgressTracker {
        ProgressTracker::new(label, self.show_progress)
    }

    async fn run(&self, session: Session) -> Result<TransferSummary> {
        match &self.cancel_token {
            Some(token) => session.with_cancellation(token.clone()).run().await,
            None => session.run().await,
        }
    }
}

/// `<dir>/<stem>-resp-errors.ndjson` next to the import file.
pub fn import_artifact_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "import".to_string());
    input.with_file_name(format!("{stem}-resp-errors.ndjson"))
}

/// `<source>-<target>-resp-errors.ndjson` in the working directory.
pub fn copy_artifact_path(source: &SearchTarget, destination: &Destination) -> PathBuf {
    let source = source.index.as_deref().unwrap_or("all");
    let target = destination.index.as_deref().unwrap_or(source);
    PathBuf::from(format!("{source}-{target}-resp-errors.ndjson"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ServerVersion;
    use crate::executor::transfer::session::TransferStatus;
    use crate::executor::transfer::testing::{BulkReply, FakeCluster, parse_bulk};
    use serde_json::json;

    fn settings() -> TransferConfig {
        TransferConfig {
            page_size: 3,
            channel_capacity: 4,
            ..TransferConfig::default()
        }
    }

    fn coordinator(cluster: Arc<FakeCluster>) -> TransferCoordinator {
        TransferCoordinator::new(cluster, settings())
    }

    fn all() -> SearchTarget {
        SearchTarget::default()
    }

    #[test]
    fn test_artifact_paths() {
        assert_eq!(
            import_artifact_path(Path::new("/data/dump.ndjson")),
            PathBuf::from("/data/dump-resp-errors.ndjson")
        );
        assert_eq!(
            copy_artifact_path(
                &SearchTarget::new(Some("logs".into()), None),
                &Destination::new(Some("logs-v2".into()), None)
            ),
            PathBuf::from("logs-logs-v2-resp-errors.ndjson")
        );
    }

    #[tokio::test]
    async fn test_export_array_source_only() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.json");
        let cluster = Arc::new(FakeCluster::with_docs(5));

        let summary = coordinator(cluster)
            .export(ExportOptions {
                source: all(),
                query: json!({}),
                output: output.clone(),
                format: OutputFormat::Array,
                payload: Payload::Source,
            })
            .await
            .unwrap();

        assert_eq!(summary.status, TransferStatus::Completed);
        assert_eq!(summary.written, 5);
        assert!(summary.file_size_bytes > 0);
        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(parsed[4], json!({ "n": 4 }));
    }

    #[tokio::test]
    async fn test_export_to_missing_directory_fails_early() {
        let cluster = Arc::new(FakeCluster::with_docs(5));
        let result = coordinator(cluster.clone())
            .export(ExportOptions {
                source: all(),
                query: json!({}),
                output: PathBuf::from("/nonexistent/dir/out.ndjson"),
                format: OutputFormat::NdJson,
                payload: Payload::Hit,
            })
            .await;
        assert!(result.is_err());
        assert_eq!(cluster.served_hits(), 0);
    }

    #[tokio::test]
    async fn test_round_trip_export_import() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.ndjson");
        let hits = (0..12)
            .map(|i| {
                json!({
                    "_index": "src",
                    "_id": format!("doc-{i}"),
                    "_score": 1.0,
                    "_source": {
                        "n": i,
                        "ratio": i as f64 / 4.0,
                        "msg": format!("h\u{e9}llo \"{i}\"\n"),
                        "tags": ["a", null, true],
                        "nested": { "z": [], "a": { "deep": i } }
                    }
                })
            })
            .collect();
        let source = Arc::new(FakeCluster::from_hits(hits));

        let exported = coordinator(source.clone())
            .export(ExportOptions {
                source: all(),
                query: json!({}),
                output: dump.clone(),
                format: OutputFormat::NdJson,
                payload: Payload::Hit,
            })
            .await
            .unwrap();
        assert_eq!(exported.written, 12);

        let target = Arc::new(FakeCluster::with_docs(0));
        let imported = coordinator(target.clone())
            .import(ImportOptions {
                input: dump.clone(),
                format: OutputFormat::NdJson,
                id_field: None,
                destination: Destination::default(),
                errors: None,
            })
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(imported.written, 12);

        let inserted: Vec<(Value, Value)> = target
            .bulk_bodies()
            .iter()
            .flat_map(|b| parse_bulk(b))
            .collect();
        assert_eq!(inserted.len(), 12);
        for ((action, doc), original) in inserted.iter().zip(source.docs()) {
            assert_eq!(action["index"]["_id"], original["_id"]);
            assert_eq!(action["index"]["_index"], original["_index"]);
            assert_eq!(doc, &original["_source"]);
        }
        assert!(!dir.path().join("dump-resp-errors.ndjson").exists());

        // Export what was imported and compare sources byte for byte
        let reimported = inserted
            .iter()
            .map(|(action, doc)| {
                json!({
                    "_index": action["index"]["_index"],
                    "_id": action["index"]["_id"],
                    "_source": doc
                })
            })
            .collect();
        let again = dir.path().join("again.ndjson");
        coordinator(Arc::new(FakeCluster::from_hits(reimported)))
            .export(ExportOptions {
                source: all(),
                query: json!({}),
                output: again.clone(),
                format: OutputFormat::NdJson,
                payload: Payload::Hit,
            })
            .await
            .unwrap();

        let sources = |path: &std::path::Path| -> Vec<String> {
            std::fs::read_to_string(path)
                .unwrap()
                .lines()
                .map(|line| {
                    let hit: Value = serde_json::from_str(line).unwrap();
                    serde_json::to_string(&hit["_source"]).unwrap()
                })
                .collect()
        };
        let first = sources(&dump);
        assert_eq!(first.len(), 12);
        assert_eq!(first, sources(&again));
    }

    #[tokio::test]
    async fn test_bulk_meta_export_reimports() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.ndjson");
        let source = Arc::new(FakeCluster::with_docs(4));

        coordinator(source)
            .export(ExportOptions {
                source: all(),
                query: json!({}),
                output: dump.clone(),
                format: OutputFormat::NdJson,
                payload: Payload::BulkMeta,
            })
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&dump).unwrap().lines().count(), 8);

        let target = Arc::new(FakeCluster::with_docs(0));
        let summary = coordinator(target.clone())
            .import(ImportOptions {
                input: dump,
                format: OutputFormat::NdJson,
                id_field: None,
                destination: Destination::new(Some("restored".into()), None),
                errors: None,
            })
            .await
            .unwrap();
        assert_eq!(summary.written, 4);
        let inserted: Vec<(Value, Value)> = target
            .bulk_bodies()
            .iter()
            .flat_map(|b| parse_bulk(b))
            .collect();
        assert!(inserted.iter().all(|(a, _)| a["index"]["_index"] == json!("restored")));
    }

    #[tokio::test]
    async fn test_bulk_meta_export_type_follows_server_version() {
        let dir = tempfile::tempdir().unwrap();
        for (version, expected) in [
            (ServerVersion::new(7, 10, 2), None),
            (ServerVersion::new(6, 8, 0), Some("_doc")),
        ] {
            let dump = dir.path().join(format!("meta-{}.ndjson", version.major));
            let source = Arc::new(FakeCluster::with_docs(2).doc_type("_doc").version(version));
            coordinator(source)
                .export(ExportOptions {
                    source: all(),
                    query: json!({}),
                    output: dump.clone(),
                    format: OutputFormat::NdJson,
                    payload: Payload::BulkMeta,
                })
                .await
                .unwrap();

            let text = std::fs::read_to_string(&dump).unwrap();
            let action: Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
            assert_eq!(action["index"]["_index"], "src");
            assert_eq!(action["index"].get("_type").and_then(Value::as_str), expected);
        }
    }

    #[tokio::test]
    async fn test_import_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.ndjson");
        std::fs::write(&input, "{\"a\":1}\n{\"a\":2}\n").unwrap();

        let cluster = Arc::new(FakeCluster::with_docs(0).bulk_reply(BulkReply::ItemErrors));
        let summary = coordinator(cluster)
            .import(ImportOptions {
                input: input.clone(),
                format: OutputFormat::NdJson,
                id_field: None,
                destination: Destination::new(Some("target".into()), None),
                errors: None,
            })
            .await
            .unwrap();

        let artifact = dir.path().join("data-resp-errors.ndjson");
        assert_eq!(summary.error_artifact.as_deref(), Some(artifact.as_path()));
        assert!(std::fs::read_to_string(&artifact).unwrap().contains("\"errors\":true"));

        let err = summary.into_result().unwrap_err();
        assert!(err.is_partial_failure());
    }

    #[tokio::test]
    async fn test_import_without_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.ndjson");
        std::fs::write(&input, "{\"a\":1}\n").unwrap();

        let cluster = Arc::new(FakeCluster::with_docs(0));
        let err = coordinator(cluster)
            .import(ImportOptions {
                input,
                format: OutputFormat::NdJson,
                id_field: None,
                destination: Destination::default(),
                errors: None,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no destination index"));
    }

    #[tokio::test]
    async fn test_import_missing_file() {
        let cluster = Arc::new(FakeCluster::with_docs(0));
        let result = coordinator(cluster)
            .import(ImportOptions {
                input: PathBuf::from("/nonexistent/data.ndjson"),
                format: OutputFormat::NdJson,
                id_field: None,
                destination: Destination::default(),
                errors: None,
            })
            .await;
        tokio_test::assert_err!(result);
    }

    #[tokio::test]
    async fn test_copy_batches_by_record_count() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(FakeCluster::with_docs(250));
        let settings = TransferConfig {
            page_size: 50,
            ..TransferConfig::default()
        };

        let summary = TransferCoordinator::new(cluster.clone(), settings)
            .copy(CopyOptions {
                source: SearchTarget::new(Some("src".into()), None),
                query: json!({ "query": { "match_all": {} } }),
                destination: Destination::new(Some("dst".into()), None),
                errors: Some(dir.path().join("errors.json")),
            })
            .await
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(summary.emitted, 250);
        assert_eq!(summary.written, 250);
        assert_eq!(summary.requests, 3);
        let sizes: Vec<usize> = cluster.bulk_bodies().iter().map(|b| parse_bulk(b).len()).collect();
        assert_eq!(sizes, vec![101, 101, 48]);
    }

    #[tokio::test]
    async fn test_copy_partial_failure_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let errors = dir.path().join("copy-errors.json");
        let cluster = Arc::new(FakeCluster::with_docs(10).bulk_reply(BulkReply::ItemErrors));

        let result = coordinator(cluster)
            .copy(CopyOptions {
                source: SearchTarget::new(Some("src".into()), None),
                query: json!({}),
                destination: Destination::new(Some("dst".into()), None),
                errors: Some(errors.clone()),
            })
            .await
            .unwrap()
            .into_result();

        assert!(result.unwrap_err().is_partial_failure());
        assert!(errors.exists());
    }
}
