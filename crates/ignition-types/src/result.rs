use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::record::SignalRecord;
use crate::status::{FinalState, SignalStatus};

/// Per-status tallies over a set of signal records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    /// Tallies the statuses of the given records in one pass.
    pub fn tally(records: &[SignalRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.add(record.status);
        }
        counts
    }

    pub fn add(&mut self, status: SignalStatus) {
        match status {
            SignalStatus::Succeeded => self.succeeded += 1,
            SignalStatus::Failed => self.failed += 1,
            SignalStatus::TimedOut => self.timed_out += 1,
            SignalStatus::Skipped => self.skipped += 1,
            SignalStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.timed_out + self.skipped + self.cancelled
    }
}

/// Outcome summary for one stage of a staged run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage's declared number.
    pub number: u32,
    /// The stage's human name.
    pub name: String,
    /// Offset from run start at which the stage's first signal started.
    pub started_at: Duration,
    /// Offset from run start at which the stage's last verdict landed.
    pub completed_at: Duration,
    /// `completed_at - started_at`.
    pub duration: Duration,
    /// The records of this stage's signals, registration-ordered.
    pub records: Vec<SignalRecord>,
    /// Per-status tallies over `records`.
    pub counts: StatusCounts,
    /// Whether every stage signal reached a verdict through normal
    /// execution (false when the run was cut short first).
    pub completed: bool,
    /// Whether the next stage started before this one finished.
    pub promoted: bool,
}

impl StageResult {
    /// Builds a stage result from its records, deriving the time window
    /// and tallies.
    pub fn from_records(
        number: u32,
        name: impl Into<String>,
        records: Vec<SignalRecord>,
        completed: bool,
        promoted: bool,
    ) -> Self {
        let started_at = records.iter().map(|r| r.started_at).min().unwrap_or(Duration::ZERO);
        let completed_at = records.iter().map(|r| r.completed_at).max().unwrap_or(Duration::ZERO);
        let counts = StatusCounts::tally(&records);
        Self {
            number,
            name: name.into(),
            started_at,
            completed_at,
            duration: completed_at.saturating_sub(started_at),
            records,
            counts,
            completed,
            promoted,
        }
    }
}

/// The frozen snapshot of one coordinator run.
///
/// Constructed once when the run finalizes and cached for the
/// coordinator's lifetime; every later inspection observes this same
/// value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// One record per registered signal, in registration order.
    pub signal_records: Vec<SignalRecord>,
    /// Per-stage summaries in stage-number order; absent outside staged
    /// execution.
    pub stage_results: Option<Vec<StageResult>>,
    /// Wall time of the whole run on the monotonic clock.
    pub total_duration: Duration,
    /// Whether the global deadline fired hard or any per-signal timeout
    /// occurred.
    pub timed_out: bool,
    /// Terminal lifecycle state of the run.
    pub final_state: FinalState,
}

impl RunResult {
    /// Whether every signal ended `Succeeded`.
    pub fn all_succeeded(&self) -> bool {
        self.signal_records.iter().all(|r| r.status.is_success())
    }

    /// Whether any signal ended `Failed`.
    pub fn has_failures(&self) -> bool {
        self.signal_records.iter().any(|r| r.status == SignalStatus::Failed)
    }

    /// Whether the run timed out or any signal ended `TimedOut`.
    pub fn has_timeouts(&self) -> bool {
        self.timed_out || self.signal_records.iter().any(|r| r.status == SignalStatus::TimedOut)
    }

    /// Looks up a record by signal name.
    pub fn record(&self, name: &str) -> Option<&SignalRecord> {
        self.signal_records.iter().find(|r| r.name == name)
    }

    /// Per-status tallies over all records.
    pub fn counts(&self) -> StatusCounts {
        StatusCounts::tally(&self.signal_records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, status: SignalStatus, start_ms: u64, end_ms: u64) -> SignalRecord {
        let mut r = SignalRecord::succeeded(
            name,
            Duration::from_millis(start_ms),
            Duration::from_millis(end_ms),
        );
        r.status = status;
        r
    }

    #[test]
    fn tally_covers_every_status() {
        let records = vec![
            record("a", SignalStatus::Succeeded, 0, 10),
            record("b", SignalStatus::Failed, 0, 5),
            record("c", SignalStatus::TimedOut, 0, 20),
            record("d", SignalStatus::Skipped, 20, 20),
            record("e", SignalStatus::Cancelled, 0, 3),
        ];
        let counts = StatusCounts::tally(&records);
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.timed_out, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn stage_result_derives_window_from_records() {
        let stage = StageResult::from_records(
            0,
            "infrastructure",
            vec![
                record("a", SignalStatus::Succeeded, 5, 40),
                record("b", SignalStatus::Succeeded, 10, 90),
            ],
            true,
            false,
        );
        assert_eq!(stage.started_at, Duration::from_millis(5));
        assert_eq!(stage.completed_at, Duration::from_millis(90));
        assert_eq!(stage.duration, Duration::from_millis(85));
        assert_eq!(stage.counts.succeeded, 2);
    }

    #[test]
    fn empty_stage_result_is_zero_width() {
        let stage = StageResult::from_records(3, "tail", vec![], false, false);
        assert_eq!(stage.started_at, Duration::ZERO);
        assert_eq!(stage.duration, Duration::ZERO);
        assert_eq!(stage.counts.total(), 0);
    }

    #[test]
    fn predicates_reflect_record_statuses() {
        let result = RunResult {
            signal_records: vec![
                record("a", SignalStatus::Succeeded, 0, 10),
                record("b", SignalStatus::Failed, 0, 5),
            ],
            stage_results: None,
            total_duration: Duration::from_millis(10),
            timed_out: false,
            final_state: FinalState::Failed,
        };
        assert!(!result.all_succeeded());
        assert!(result.has_failures());
        assert!(!result.has_timeouts());
        assert_eq!(result.record("b").map(|r| r.status), Some(SignalStatus::Failed));
    }

    #[test]
    fn timed_out_flag_alone_reports_timeouts() {
        let result = RunResult {
            signal_records: vec![record("a", SignalStatus::Succeeded, 0, 10)],
            stage_results: None,
            total_duration: Duration::from_millis(10),
            timed_out: true,
            final_state: FinalState::TimedOut,
        };
        assert!(result.has_timeouts());
    }
}
