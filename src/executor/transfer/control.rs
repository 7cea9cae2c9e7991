//! Control protocol between the pipeline stages and the session
//!
//! Each stage gets its own pair of ports:
//! - an input port carrying [`Directive`]s from the session to the stage
//! - a one-shot output port carrying the stage's terminal [`StageOutcome`]
//!
//! Keeping one pair per direction means a stage reporting its outcome never
//! waits on the other stage, so the two can never deadlock on each other.
//! Records travel on a separate bounded channel; closing it never means
//! "done". Completion is only ever reported through the output port.

use std::fmt;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{ShelasticError, TransferError};

/// Room for a `Finish` followed by a `Stop`.
const DIRECTIVE_SLOTS: usize = 2;

/// Instruction sent from the session to a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// The producer is done: drain what is left, then complete.
    Finish,
    /// Stop at the next channel operation boundary.
    Stop,
}

/// Terminal report of a stage.
#[derive(Debug)]
pub enum StageOutcome<T> {
    /// Ran to the end.
    Completed(T),
    /// Obeyed a `Stop` directive.
    Stopped(T),
    /// Hit an error it could not recover from.
    Failed(ShelasticError),
}

impl<T> StageOutcome<T> {
    pub fn kind(&self) -> &'static str {
        match self {
            StageOutcome::Completed(_) => "completed",
            StageOutcome::Stopped(_) => "stopped",
            StageOutcome::Failed(_) => "failed",
        }
    }

    pub fn into_report(self) -> Option<T> {
        match self {
            StageOutcome::Completed(r) | StageOutcome::Stopped(r) => Some(r),
            StageOutcome::Failed(_) => None,
        }
    }
}

/// Stage side of the ports.
pub struct StageControl<T> {
    name: &'static str,
    directives: mpsc::Receiver<Directive>,
    outcome: oneshot::Sender<StageOutcome<T>>,
}

/// Session side of the ports.
pub struct StageHandle<T> {
    name: &'static str,
    directives: mpsc::Sender<Directive>,
    outcome: oneshot::Receiver<StageOutcome<T>>,
}

/// Create the port pair for one stage.
pub fn stage_ports<T>(name: &'static str) -> (StageHandle<T>, StageControl<T>) {
    let (directive_tx, directive_rx) = mpsc::channel(DIRECTIVE_SLOTS);
    let (outcome_tx, outcome_rx) = oneshot::channel();
    (
        StageHandle {
            name,
            directives: directive_tx,
            outcome: outcome_rx,
        },
        StageControl {
            name,
            directives: directive_rx,
            outcome: outcome_tx,
        },
    )
}

impl<T> StageControl<T> {
    /// Non-blocking check for a pending directive.
    ///
    /// A session that went away counts as `Stop`.
    pub fn poll(&mut self) -> Option<Directive> {
        match self.directives.try_recv() {
            Ok(directive) => Some(directive),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(Directive::Stop),
        }
    }

    /// Wait for the next directive. Cancel safe.
    pub async fn directive(&mut self) -> Directive {
        self.directives.recv().await.unwrap_or(Directive::Stop)
    }

    /// Report the terminal outcome. Consumes the port, so a stage reports once.
    pub fn report(self, outcome: StageOutcome<T>) {
        debug!("{} stage {}", self.name, outcome.kind());
        if self.outcome.send(outcome).is_err() {
            debug!("{} stage outcome dropped: session already gone", self.name);
        }
    }
}

impl<T> StageHandle<T> {
    /// Deliver a directive. A stage that already exited ignores it.
    pub fn send(&self, directive: Directive) {
        debug!("Sending {:?} to {} stage", directive, self.name);
        if self.directives.try_send(directive).is_err() {
            debug!("{} stage no longer accepts directives", self.name);
        }
    }

    /// Wait for the stage's terminal outcome. Cancel safe.
    ///
    /// A stage that dropped its port without reporting (a panic) is a failure.
    pub async fn outcome(&mut self) -> StageOutcome<T> {
        match (&mut self.outcome).await {
            Ok(outcome) => outcome,
            Err(_) => StageOutcome::Failed(
                TransferError::StageAborted(format!("{} stage exited without a report", self.name))
                    .into(),
            ),
        }
    }
}

/// Lifecycle of one transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    ProducerDone,
    ProducerFailed,
    SinkFailed,
    Interrupted,
    /// The other party has been notified and is being awaited.
    Cancelling,
    Terminated,
}

/// What moved the session forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    ProducerCompleted,
    ProducerFailed,
    SinkFailed,
    Interrupt,
    CounterpartNotified,
    BothSettled,
}

impl SessionState {
    /// Apply an event.
    ///
    /// # Panics
    /// On a transition the protocol does not allow; that is a bug in the
    /// session loop, not a runtime condition.
    pub fn advance(self, event: SessionEvent) -> SessionState {
        use SessionEvent as E;
        use SessionState as S;
        match (self, event) {
            (S::Running, E::ProducerCompleted) => S::ProducerDone,
            (S::Running, E::ProducerFailed) => S::ProducerFailed,
            (S::Running, E::SinkFailed) => S::SinkFailed,
            (S::Running, E::Interrupt) => S::Interrupted,
            (
                S::ProducerDone | S::ProducerFailed | S::SinkFailed | S::Interrupted,
                E::CounterpartNotified,
            ) => S::Cancelling,
            (S::Cancelling, E::BothSettled) => S::Terminated,
            (state, event) => panic!("invalid session transition: {state} on {event:?}"),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Running => "RUNNING",
            SessionState::ProducerDone => "PRODUCER_DONE",
            SessionState::ProducerFailed => "PRODUCER_FAILED",
            SessionState::SinkFailed => "SINK_FAILED",
            SessionState::Interrupted => "INTERRUPTED",
            SessionState::Cancelling => "CANCELLING",
            SessionState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}
