//! Record sinks and the loop that drives them

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;

use super::control::{Directive, StageControl, StageOutcome};
use super::record::TransferRecord;

/// What a sink reports when it ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkReport {
    /// Records written to the file or accepted by bulk requests.
    pub written: u64,
    /// Bulk requests sent.
    pub requests: u64,
    /// Bulk requests whose response reported item errors.
    pub failed_batches: u64,
    /// Individual failed items across those requests.
    pub failed_items: u64,
    /// Side file holding failed responses, when one was written.
    pub error_artifact: Option<PathBuf>,
    /// Size of the output file (file sinks only).
    pub file_size_bytes: u64,
}

/// A consumer of transfer records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Take one record. An error ends the sink.
    async fn accept(&mut self, record: TransferRecord) -> Result<()>;

    /// All input has arrived: flush whatever is still buffered.
    async fn complete(&mut self) -> Result<()>;

    /// The sink is being stopped or has failed; release what it holds.
    async fn abandon(&mut self);

    /// Counters for the summary.
    async fn report(&self) -> SinkReport;
}

/// Drive a sink until it completes, is stopped, or fails.
///
/// Directives are always checked before the next record, so a stop is
/// seen promptly even with records still queued. The sink completes only
/// after it was told `Finish` and the record channel has closed.
pub async fn run_sink<S: RecordSink>(
    mut sink: S,
    mut records: mpsc::Receiver<TransferRecord>,
    mut control: StageControl<SinkReport>,
) {
    let mut draining = false;
    let mut closed = false;

    let outcome = loop {
        if draining && closed {
            break match sink.complete().await {
                Ok(()) => StageOutcome::Completed(sink.report().await),
                Err(e) => {
                    sink.abandon().await;
                    StageOutcome::Failed(e)
                }
            };
        }

        tokio::select! {
            biased;
            directive = control.directive() => match directive {
                Directive::Finish => {
                    debug!("Sink draining remaining records");
                    draining = true;
                }
                Directive::Stop => {
                    sink.abandon().await;
                    break StageOutcome::Stopped(sink.report().await);
                }
            },
            record = records.recv(), if !closed => match record {
                Some(record) => {
                    if let Err(e) = sink.accept(record).await {
                        sink.abandon().await;
                        break StageOutcome::Failed(e);
                    }
                }
                None => closed = true,
            },
        }
    };

    drop(records);
    control.report(outcome);
}
