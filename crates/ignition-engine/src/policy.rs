use std::time::Duration;

use ignition_types::{ExecutionMode, SignalRecord, SignalStatus};

/// Read-only snapshot handed to a policy after each signal completes.
///
/// The slices borrow the coordinator's ledger under the classification
/// lock; policies must not stash references, block on I/O, or take
/// longer than a trivial computation.
#[derive(Debug)]
pub struct PolicyContext<'a> {
    /// The record that just landed.
    pub latest: &'a SignalRecord,
    /// Every previously completed record, in completion order.
    pub completed: &'a [SignalRecord],
    /// How many signals the run registered in total.
    pub total_signals: usize,
    /// Monotonic time since the run started.
    pub elapsed: Duration,
    /// Whether the global deadline has already elapsed.
    pub global_deadline_elapsed: bool,
    /// The run's execution mode.
    pub execution_mode: ExecutionMode,
}

/// Decision predicate consulted after each signal completes.
///
/// Called serially from the coordinator's classification section, even
/// under parallel execution. Must be deterministic. Returning `false`
/// stops further signals from starting; signals already in flight finish
/// unless cancellation is demanded by other options.
pub trait IgnitionPolicy: Send + Sync {
    fn should_continue(&self, ctx: &PolicyContext<'_>) -> bool;

    /// Stable name used in recordings.
    fn name(&self) -> &'static str {
        "custom"
    }

    /// Whether `run_all` raises when this policy stops a run on failures.
    ///
    /// Only the fail-fast built-in returns `true`; record-only policies
    /// keep failures on the result.
    fn raises_on_failure(&self) -> bool {
        false
    }
}

/// Continue only while everything succeeds.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailFast;

impl IgnitionPolicy for FailFast {
    fn should_continue(&self, ctx: &PolicyContext<'_>) -> bool {
        ctx.latest.status == SignalStatus::Succeeded
    }

    fn name(&self) -> &'static str {
        "fail_fast"
    }

    fn raises_on_failure(&self) -> bool {
        true
    }
}

/// Always continue; failures live on the records.
#[derive(Clone, Copy, Debug, Default)]
pub struct BestEffort;

impl IgnitionPolicy for BestEffort {
    fn should_continue(&self, _ctx: &PolicyContext<'_>) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "best_effort"
    }
}

/// Tolerate timeouts, stop on failures.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContinueOnTimeout;

impl IgnitionPolicy for ContinueOnTimeout {
    fn should_continue(&self, ctx: &PolicyContext<'_>) -> bool {
        ctx.latest.status != SignalStatus::Failed
    }

    fn name(&self) -> &'static str {
        "continue_on_timeout"
    }
}
