use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::signal_error::SignalError;
use crate::status::{CancellationReason, SignalStatus};

/// Immutable outcome snapshot for one signal.
///
/// Created exactly once per signal the coordinator observes, at the moment
/// the signal's verdict lands. `started_at` and `completed_at` are offsets
/// from the coordinator's monotonic start; a signal that never started has
/// both stamped with the moment the skip verdict was recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// The signal's registered name.
    pub name: String,
    /// Terminal classification of the outcome.
    pub status: SignalStatus,
    /// Offset from run start at which the operation began (or was skipped).
    pub started_at: Duration,
    /// Offset from run start at which the verdict landed.
    pub completed_at: Duration,
    /// `completed_at - started_at`.
    pub duration: Duration,
    /// The failure cause, retained verbatim, when the operation faulted.
    pub failure: Option<SignalError>,
    /// Direct prerequisites that ended in a non-success status, for
    /// `Skipped` records produced by dependency propagation.
    pub failed_dependencies: Option<Vec<String>>,
    /// Why a cancellation (or skip) happened, when one did.
    pub cancellation_reason: Option<CancellationReason>,
    /// The originating failed signal, for dependency-failure cancellation.
    pub cancelled_by: Option<String>,
    /// Stage number, when a stage plan assigned one.
    pub stage: Option<u32>,
    /// Declared direct prerequisites, when a graph was registered.
    pub dependencies: Option<Vec<String>>,
}

impl SignalRecord {
    fn base(name: impl Into<String>, status: SignalStatus, started_at: Duration, completed_at: Duration) -> Self {
        Self {
            name: name.into(),
            status,
            started_at,
            completed_at,
            duration: completed_at.saturating_sub(started_at),
            failure: None,
            failed_dependencies: None,
            cancellation_reason: None,
            cancelled_by: None,
            stage: None,
            dependencies: None,
        }
    }

    /// Record for an operation that completed without error in time.
    pub fn succeeded(name: impl Into<String>, started_at: Duration, completed_at: Duration) -> Self {
        Self::base(name, SignalStatus::Succeeded, started_at, completed_at)
    }

    /// Record for an operation that produced a non-cancellation failure.
    pub fn failed(
        name: impl Into<String>,
        started_at: Duration,
        completed_at: Duration,
        failure: SignalError,
    ) -> Self {
        let mut record = Self::base(name, SignalStatus::Failed, started_at, completed_at);
        record.failure = Some(failure);
        record
    }

    /// Record for a deadline verdict (per-signal or global).
    pub fn timed_out(
        name: impl Into<String>,
        started_at: Duration,
        completed_at: Duration,
        reason: CancellationReason,
    ) -> Self {
        let mut record = Self::base(name, SignalStatus::TimedOut, started_at, completed_at);
        record.cancellation_reason = Some(reason);
        record
    }

    /// Record for a cancellation unrelated to deadlines.
    pub fn cancelled(
        name: impl Into<String>,
        started_at: Duration,
        completed_at: Duration,
        reason: CancellationReason,
    ) -> Self {
        let mut record = Self::base(name, SignalStatus::Cancelled, started_at, completed_at);
        record.cancellation_reason = Some(reason);
        record
    }

    /// Record for a signal that was never started.
    ///
    /// `at` stamps both `started_at` and `completed_at`; the record is
    /// zero-width by construction.
    pub fn skipped(name: impl Into<String>, at: Duration, reason: Option<CancellationReason>) -> Self {
        let mut record = Self::base(name, SignalStatus::Skipped, at, at);
        record.cancellation_reason = reason;
        record
    }

    /// Attaches the originating failed signal for dependency propagation.
    pub fn with_cancelled_by(mut self, origin: impl Into<String>) -> Self {
        self.cancelled_by = Some(origin.into());
        self
    }

    /// Attaches the direct prerequisites that ended badly.
    pub fn with_failed_dependencies(mut self, deps: Vec<String>) -> Self {
        self.failed_dependencies = Some(deps);
        self
    }

    /// Attaches the stage number this signal belonged to.
    pub fn with_stage(mut self, stage: u32) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Attaches the declared direct prerequisites.
    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        if !deps.is_empty() {
            self.dependencies = Some(deps);
        }
        self
    }

    /// Attaches the failure cause without changing the status.
    ///
    /// Used when a frozen timeout verdict still wants to retain the
    /// operation's eventual error for diagnostics.
    pub fn with_failure(mut self, failure: SignalError) -> Self {
        self.failure = Some(failure);
        self
    }
}
