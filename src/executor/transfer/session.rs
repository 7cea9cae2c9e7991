//! One producer/sink pairing and its teardown

use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, ShelasticError, TransferError};

use super::control::{
    Directive, SessionEvent, SessionState, StageControl, StageHandle, StageOutcome, stage_ports,
};
use super::producer::ProducerReport;
use super::record::TransferRecord;
use super::sink::SinkReport;

/// How a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    /// Interrupted by the user; not a failure.
    Cancelled,
}

/// Result of a transfer session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub status: TransferStatus,
    /// Records the producer handed over
    pub emitted: u64,
    /// Total announced by the source
    pub total: u64,
    /// Records the sink wrote or submitted
    pub written: u64,
    /// Bulk requests sent
    pub requests: u64,
    /// Bulk requests reporting item errors
    pub failed_batches: u64,
    /// Individual failed items
    pub failed_items: u64,
    /// Side file with failed bulk responses
    pub error_artifact: Option<PathBuf>,
    /// Output file size in bytes (export only)
    pub file_size_bytes: u64,
    /// Time taken
    pub elapsed_ms: u64,
}

impl TransferSummary {
    pub fn is_cancelled(&self) -> bool {
        self.status == TransferStatus::Cancelled
    }

    /// Turn a run with failed bulk items into an error, so the process
    /// exits with a failure status.
    pub fn into_result(self) -> Result<Self> {
        if self.failed_batches == 0 {
            return Ok(self);
        }
        Err(TransferError::PartialFailure {
            failed_batches: self.failed_batches,
            artifact: self.error_artifact.unwrap_or_default(),
        }
        .into())
    }
}

/// A running producer and sink connected by a bounded record channel.
///
/// `run` consumes the session, so it is torn down exactly once.
pub struct Session {
    producer: StageHandle<ProducerReport>,
    sink: StageHandle<SinkReport>,
    tasks: Vec<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    started: Instant,
}

impl Session {
    /// Spawn both stages.
    ///
    /// # Arguments
    /// * `capacity` - Record channel capacity; bounds records in flight
    /// * `producer` - Builds the producer task from its channel end and port
    /// * `sink` - Builds the sink task from its channel end and port
    pub fn start<P, PF, S, SF>(capacity: usize, producer: P, sink: S) -> Self
    where
        P: FnOnce(mpsc::Sender<TransferRecord>, StageControl<ProducerReport>) -> PF,
        PF: Future<Output = ()> + Send + 'static,
        S: FnOnce(mpsc::Receiver<TransferRecord>, StageControl<SinkReport>) -> SF,
        SF: Future<Output = ()> + Send + 'static,
    {
        let (records_tx, records_rx) = mpsc::channel(capacity.max(1));
        let (producer_handle, producer_control) = stage_ports("producer");
        let (sink_handle, sink_control) = stage_ports("sink");

        debug!("Starting transfer session, channel capacity {}", capacity);
        let tasks = vec![
            tokio::spawn(producer(records_tx, producer_control)),
            tokio::spawn(sink(records_rx, sink_control)),
        ];

        Self {
            producer: producer_handle,
            sink: sink_handle,
            tasks,
            cancel_token: None,
            started: Instant::now(),
        }
    }

    /// Set cancellation token for this session
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Wait for both stages and decide the outcome.
    ///
    /// The first terminal report decides what the other stage is told:
    /// a completed producer lets the sink drain (`Finish`), anything else
    /// stops it (`Stop`). An interrupt stops both.
    pub async fn run(mut self) -> Result<TransferSummary> {
        let cancel = self.cancel_token.take().unwrap_or_default();
        let mut state = SessionState::Running;
        let mut trigger = None;
        let mut interrupted = false;
        let mut producer_outcome: Option<StageOutcome<ProducerReport>> = None;
        let mut sink_outcome: Option<StageOutcome<SinkReport>> = None;

        while producer_outcome.is_none() || sink_outcome.is_none() {
            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !interrupted => {
                    info!("Transfer interrupted");
                    interrupted = true;
                    self.producer.send(Directive::Stop);
                    self.sink.send(Directive::Stop);
                    if state == SessionState::Running {
                        state = state.advance(SessionEvent::Interrupt);
                        trigger = Some(state);
                        state = state.advance(SessionEvent::CounterpartNotified);
                    }
                }
                outcome = self.producer.outcome(), if producer_outcome.is_none() => {
                    if state == SessionState::Running {
                        let (event, directive) = match &outcome {
                            StageOutcome::Completed(_) => {
                                (SessionEvent::ProducerCompleted, Directive::Finish)
                            }
                            _ => (SessionEvent::ProducerFailed, Directive::Stop),
                        };
                        state = state.advance(event);
                        trigger = Some(state);
                        self.sink.send(directive);
                        state = state.advance(SessionEvent::CounterpartNotified);
                    }
                    producer_outcome = Some(outcome);
                }
                outcome = self.sink.outcome(), if sink_outcome.is_none() => {
                    if state == SessionState::Running {
                        state = state.advance(SessionEvent::SinkFailed);
                        trigger = Some(state);
                        self.producer.send(Directive::Stop);
                        state = state.advance(SessionEvent::CounterpartNotified);
                    }
                    sink_outcome = Some(outcome);
                }
            }
        }
        state = state.advance(SessionEvent::BothSettled);
        debug!("Transfer session {} (trigger: {:?})", state, trigger);

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Transfer stage task ended abnormally: {}", e);
            }
        }

        let (Some(producer), Some(sink)) = (producer_outcome, sink_outcome) else {
            return Err(aborted("session ended without both reports"));
        };
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        settle(trigger, interrupted, producer, sink, elapsed_ms)
    }
}

/// Pick the user-facing result once both stages have reported.
///
/// The stage whose report ended the session owns the error. A stage that
/// stopped or completed without being asked to counts as aborted.
fn settle(
    trigger: Option<SessionState>,
    interrupted: bool,
    producer: StageOutcome<ProducerReport>,
    sink: StageOutcome<SinkReport>,
    elapsed_ms: u64,
) -> Result<TransferSummary> {
    let (producer, sink) = match trigger {
        Some(SessionState::ProducerFailed) => {
            return Err(match producer {
                StageOutcome::Failed(e) => e,
                _ => aborted("producer stopped before its input was exhausted"),
            });
        }
        Some(SessionState::SinkFailed) => {
            return Err(match sink {
                StageOutcome::Failed(e) => e,
                _ => aborted("sink ended before its input"),
            });
        }
        Some(SessionState::ProducerDone) => {
            let producer = producer.into_report().unwrap_or_default();
            let sink = match sink {
                StageOutcome::Completed(report) => report,
                StageOutcome::Stopped(report) if interrupted => report,
                StageOutcome::Stopped(_) => return Err(aborted("sink stopped on its own")),
                StageOutcome::Failed(e) => return Err(e),
            };
            (producer, sink)
        }
        _ => {
            let producer = match producer {
                StageOutcome::Failed(e) => return Err(e),
                other => other.into_report().unwrap_or_default(),
            };
            let sink = match sink {
                StageOutcome::Failed(e) => return Err(e),
                other => other.into_report().unwrap_or_default(),
            };
            (producer, sink)
        }
    };

    let status = if interrupted {
        TransferStatus::Cancelled
    } else {
        TransferStatus::Completed
    };
    info!(
        "Transfer {:?}: {} of {} records emitted, {} written, {} ms",
        status, producer.emitted, producer.total, sink.written, elapsed_ms
    );

    Ok(TransferSummary {
        status,
        emitted: producer.emitted,
        total: producer.total,
        written: sink.written,
        requests: sink.requests,
        failed_batches: sink.failed_batches,
        failed_items: sink.failed_items,
        error_artifact: sink.error_artifact,
        file_size_bytes: sink.file_size_bytes,
        elapsed_ms,
    })
}

fn aborted(message: &str) -> ShelasticError {
    TransferError::StageAborted(message.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SearchTarget;
    use crate::executor::transfer::file_sink::FileSink;
    use crate::executor::transfer::producer::{CursorProducer, parse_query};
    use crate::executor::transfer::progress::ProgressTracker;
    use crate::executor::transfer::sink::run_sink;
    use crate::executor::transfer::testing::{FailingWriter, FakeCluster, relay_outcome};
    use crate::executor::transfer::writers::{OutputFormat, Payload, open_writer};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    fn producer(cluster: Arc<FakeCluster>, page_size: usize) -> CursorProducer {
        CursorProducer::new(cluster, SearchTarget::default(), parse_query(None).unwrap(), page_size, "1m")
    }

    fn summary(failed_batches: u64) -> TransferSummary {
        TransferSummary {
            status: TransferStatus::Completed,
            emitted: 3,
            total: 3,
            written: 3,
            requests: 1,
            failed_batches,
            failed_items: failed_batches,
            error_artifact: (failed_batches > 0).then(|| PathBuf::from("in-resp-errors.ndjson")),
            file_size_bytes: 0,
            elapsed_ms: 1,
        }
    }

    #[test]
    fn test_into_result() {
        assert!(summary(0).into_result().is_ok());
        let err = summary(2).into_result().unwrap_err();
        assert!(err.is_partial_failure());
        assert!(err.to_string().contains("in-resp-errors.ndjson"));
    }

    #[tokio::test]
    async fn test_completed_session_counts_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let cluster = Arc::new(FakeCluster::with_docs(25));
        let writer = open_writer(&path, OutputFormat::NdJson, Payload::Hit).await.unwrap();
        let sink = FileSink::new(writer, ProgressTracker::new("export", false));
        let producer = producer(cluster, 4);

        let session = Session::start(
            3,
            |tx, control| producer.run(tx, control),
            |rx, control| run_sink(sink, rx, control),
        );
        let summary = timeout(Duration::from_secs(10), session.run())
            .await
            .expect("session did not finish")
            .unwrap();

        assert_eq!(summary.status, TransferStatus::Completed);
        assert_eq!(summary.total, 25);
        assert_eq!(summary.emitted, 25);
        assert_eq!(summary.written, 25);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 25);
    }

    #[tokio::test]
    async fn test_sink_failure_stops_producer() {
        let cluster = Arc::new(FakeCluster::with_docs(20));
        let sink = FileSink::new(Box::new(FailingWriter::new(4)), ProgressTracker::new("export", false));
        let producer = producer(cluster.clone(), 2);

        let session = Session::start(
            2,
            |tx, control| producer.run(tx, control),
            |rx, control| run_sink(sink, rx, control),
        );
        let result = timeout(Duration::from_secs(5), session.run())
            .await
            .expect("session deadlocked");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert!(cluster.served_hits() < 20);
    }

    #[tokio::test]
    async fn test_sink_failure_reports_sink_error_and_stops_producer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let cluster = Arc::new(FakeCluster::with_docs(10));
        let inner = open_writer(&path, OutputFormat::NdJson, Payload::Hit).await.unwrap();
        let writer = FailingWriter::wrapping(inner, 4);
        let sink = FileSink::new(Box::new(writer), ProgressTracker::new("export", false));
        let producer = producer(cluster, 2);
        let (seen_tx, seen_rx) = oneshot::channel();

        let session = Session::start(
            2,
            |tx, control| relay_outcome(control, seen_tx, move |inner| producer.run(tx, inner)),
            |rx, control| run_sink(sink, rx, control),
        );
        let err = timeout(Duration::from_secs(5), session.run())
            .await
            .expect("session deadlocked")
            .unwrap_err();

        assert!(err.to_string().contains("disk full"));
        assert_eq!(seen_rx.await.unwrap(), "stopped");
        let lines = std::fs::read_to_string(&path).unwrap().lines().count();
        assert!(lines <= 3, "{lines} records written");
    }

    #[tokio::test]
    async fn test_producer_failure_stops_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let cluster = Arc::new(FakeCluster::with_docs(5).without_scroll_id());
        let writer = open_writer(&path, OutputFormat::NdJson, Payload::Hit).await.unwrap();
        let sink = FileSink::new(writer, ProgressTracker::new("export", false));
        let producer = producer(cluster, 2);

        let session = Session::start(
            2,
            |tx, control| producer.run(tx, control),
            |rx, control| run_sink(sink, rx, control),
        );
        let err = timeout(Duration::from_secs(5), session.run())
            .await
            .expect("session deadlocked")
            .unwrap_err();
        assert!(err.to_string().contains("_scroll_id"));
    }

    #[tokio::test]
    async fn test_interrupt_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let cluster = Arc::new(FakeCluster::with_docs(1000));
        let writer = open_writer(&path, OutputFormat::NdJson, Payload::Hit).await.unwrap();
        let sink = FileSink::new(writer, ProgressTracker::new("export", false));
        let producer = producer(cluster, 10);

        let token = CancellationToken::new();
        token.cancel();
        let session = Session::start(
            2,
            |tx, control| producer.run(tx, control),
            |rx, control| run_sink(sink, rx, control),
        )
        .with_cancellation(token);

        let summary = timeout(Duration::from_secs(5), session.run())
            .await
            .expect("session deadlocked")
            .unwrap();
        assert!(summary.is_cancelled());
        assert!(summary.emitted < 1000);
    }
}
