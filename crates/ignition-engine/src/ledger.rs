use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use ignition_types::{ExecutionMode, SignalError, SignalRecord, SignalStatus};

use crate::policy::{IgnitionPolicy, PolicyContext};

/// Single-writer run ledger: the classification critical section.
///
/// Every verdict funnels through this structure under one lock, which is
/// what serializes policy invocations even in parallel execution. Slots
/// are registration-ordered and written at most once; the first verdict
/// for a signal wins and later ones are dropped, which keeps records
/// immutable once created.
///
/// Nothing here suspends: completions hold the lock only for record
/// storage, tallying, and the policy call.
pub(crate) struct RunLedger {
    total: usize,
    execution_mode: ExecutionMode,
    inner: Mutex<LedgerInner>,
    stop: AtomicBool,
    timed_out: AtomicBool,
    global_deadline_elapsed: AtomicBool,
    progress_tx: watch::Sender<u64>,
}

struct LedgerInner {
    slots: Vec<Option<SignalRecord>>,
    /// Clones of every stored record, in completion order.
    completed: Vec<SignalRecord>,
    /// Start offsets of signals that have begun but not yet settled.
    started: Vec<Option<Duration>>,
}

impl RunLedger {
    pub(crate) fn new(total: usize, execution_mode: ExecutionMode) -> Self {
        let (progress_tx, _) = watch::channel(0u64);
        Self {
            total,
            execution_mode,
            inner: Mutex::new(LedgerInner {
                slots: vec![None; total],
                completed: Vec::with_capacity(total),
                started: vec![None; total],
            }),
            stop: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
            global_deadline_elapsed: AtomicBool::new(false),
            progress_tx,
        }
    }

    /// Notes the moment a signal's operation began.
    pub(crate) fn mark_started(&self, index: usize, at: Duration) {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner.started[index] = Some(at);
    }

    pub(crate) fn started_at(&self, index: usize) -> Option<Duration> {
        self.inner.lock().expect("ledger lock poisoned").started[index]
    }

    /// Stores a completion verdict and runs the policy funnel.
    ///
    /// Returns whether the run should keep starting signals. The policy
    /// only sees verdicts that came from an actual evaluation; skip
    /// records go through [`Self::record_skip`] and never consult it.
    pub(crate) fn complete(
        &self,
        index: usize,
        record: SignalRecord,
        policy: &dyn IgnitionPolicy,
        elapsed: Duration,
    ) -> bool {
        {
            let mut inner = self.inner.lock().expect("ledger lock poisoned");
            if inner.slots[index].is_some() {
                return !self.stop.load(Ordering::SeqCst);
            }
            if record.status == SignalStatus::TimedOut {
                self.timed_out.store(true, Ordering::SeqCst);
            }
            inner.slots[index] = Some(record.clone());
            inner.completed.push(record);

            let (latest, completed) = match inner.completed.split_last() {
                Some(pair) => pair,
                None => return true,
            };
            let ctx = PolicyContext {
                latest,
                completed,
                total_signals: self.total,
                elapsed,
                global_deadline_elapsed: self.global_deadline_elapsed.load(Ordering::SeqCst),
                execution_mode: self.execution_mode,
            };
            if !policy.should_continue(&ctx) {
                self.stop.store(true, Ordering::SeqCst);
            }
        }
        self.progress_tx.send_modify(|n| *n += 1);
        !self.stop.load(Ordering::SeqCst)
    }

    /// Stores a verdict for a signal that never ran (skip or propagated
    /// cancellation). Bypasses the policy.
    pub(crate) fn record_skip(&self, index: usize, record: SignalRecord) {
        {
            let mut inner = self.inner.lock().expect("ledger lock poisoned");
            if inner.slots[index].is_some() {
                return;
            }
            if record.status == SignalStatus::TimedOut {
                self.timed_out.store(true, Ordering::SeqCst);
            }
            inner.slots[index] = Some(record.clone());
            inner.completed.push(record);
        }
        self.progress_tx.send_modify(|n| *n += 1);
    }

    pub(crate) fn is_recorded(&self, index: usize) -> bool {
        self.inner.lock().expect("ledger lock poisoned").slots[index].is_some()
    }

    /// Status of a recorded signal, if settled.
    pub(crate) fn status_of(&self, index: usize) -> Option<SignalStatus> {
        self.inner.lock().expect("ledger lock poisoned").slots[index]
            .as_ref()
            .map(|r| r.status)
    }

    /// The originating failed signal noted on a settled record, if any.
    pub(crate) fn cancelled_origin(&self, index: usize) -> Option<String> {
        self.inner.lock().expect("ledger lock poisoned").slots[index]
            .as_ref()
            .and_then(|r| r.cancelled_by.clone())
    }

    pub(crate) fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Latched when any timeout verdict lands or the global deadline
    /// fires hard.
    pub(crate) fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    pub(crate) fn latch_timed_out(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
    }

    pub(crate) fn latch_global_deadline(&self) {
        self.global_deadline_elapsed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn global_deadline_elapsed(&self) -> bool {
        self.global_deadline_elapsed.load(Ordering::SeqCst)
    }

    /// A receiver that ticks on every stored verdict; used by stage
    /// promotion monitoring.
    pub(crate) fn progress(&self) -> watch::Receiver<u64> {
        self.progress_tx.subscribe()
    }

    /// Indices that still have no verdict, registration-ordered.
    pub(crate) fn unsettled(&self) -> Vec<usize> {
        let inner = self.inner.lock().expect("ledger lock poisoned");
        (0..self.total).filter(|&i| inner.slots[i].is_none()).collect()
    }

    /// Per-status tallies over the given indices; unsettled slots count
    /// as nothing.
    pub(crate) fn tally(&self, indices: &[usize]) -> (usize, usize) {
        let inner = self.inner.lock().expect("ledger lock poisoned");
        let mut succeeded = 0;
        let mut settled = 0;
        for &i in indices {
            if let Some(record) = &inner.slots[i] {
                settled += 1;
                if record.status == SignalStatus::Succeeded {
                    succeeded += 1;
                }
            }
        }
        (succeeded, settled)
    }

    /// Failures in completion order, for the fail-fast aggregate.
    pub(crate) fn failures(&self) -> Vec<(String, SignalError)> {
        let inner = self.inner.lock().expect("ledger lock poisoned");
        inner
            .completed
            .iter()
            .filter(|r| r.status == SignalStatus::Failed)
            .filter_map(|r| r.failure.clone().map(|f| (r.name.clone(), f)))
            .collect()
    }

    /// The first completion-order record that is not a success, if any.
    /// Drives the fail-fast raise rules.
    pub(crate) fn first_unsuccessful(&self) -> Option<SignalRecord> {
        let inner = self.inner.lock().expect("ledger lock poisoned");
        inner
            .completed
            .iter()
            .find(|r| r.status != SignalStatus::Succeeded)
            .cloned()
    }

    /// Registration-ordered snapshot of every record.
    ///
    /// Precondition: every slot is settled (the coordinator finalizes
    /// stragglers first).
    pub(crate) fn records(&self) -> Vec<SignalRecord> {
        let inner = self.inner.lock().expect("ledger lock poisoned");
        inner
            .slots
            .iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                Some(record) => record.clone(),
                None => unreachable_slot(i),
            })
            .collect()
    }
}

// Kept out of line so the closure in `records` stays readable.
fn unreachable_slot(index: usize) -> SignalRecord {
    debug_assert!(false, "slot {index} left unsettled at finalize");
    SignalRecord::skipped(format!("<unsettled-{index}>"), Duration::ZERO, None)
}
