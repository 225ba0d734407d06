use std::collections::BTreeMap;

use crate::recording::{Recording, RecordedSignal};

/// Per-signal difference between two recordings of the same system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalDiff {
    pub name: String,
    pub status_before: String,
    pub status_after: String,
    /// `after - before`, in milliseconds.
    pub duration_delta_ms: i64,
}

impl SignalDiff {
    /// Whether the classification changed (duration drift alone does not
    /// count).
    pub fn status_changed(&self) -> bool {
        self.status_before != self.status_after
    }

    /// A previously green signal that is no longer green.
    pub fn is_regression(&self) -> bool {
        self.status_before == "Succeeded" && self.status_after != "Succeeded"
    }
}

/// Structural comparison of two recordings, for offline triage of "what
/// changed between these startups".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordingDiff {
    /// `(before, after)` when the final state differs.
    pub final_state_change: Option<(Option<String>, Option<String>)>,
    /// `(before, after)` when the timed-out flag differs.
    pub timed_out_change: Option<(bool, bool)>,
    /// `after - before`, in milliseconds.
    pub total_duration_delta_ms: i64,
    /// Signals present in both runs, in the first run's order.
    pub signals: Vec<SignalDiff>,
    pub only_in_first: Vec<String>,
    pub only_in_second: Vec<String>,
}

impl RecordingDiff {
    /// Compares two recordings signal-by-signal.
    pub fn between(first: &Recording, second: &Recording) -> Self {
        let second_by_name: BTreeMap<&str, &RecordedSignal> = second
            .signals
            .iter()
            .map(|s| (s.signal_name.as_str(), s))
            .collect();
        let first_names: BTreeMap<&str, ()> = first
            .signals
            .iter()
            .map(|s| (s.signal_name.as_str(), ()))
            .collect();

        let mut signals = Vec::new();
        let mut only_in_first = Vec::new();
        for before in &first.signals {
            match second_by_name.get(before.signal_name.as_str()) {
                Some(after) => signals.push(SignalDiff {
                    name: before.signal_name.clone(),
                    status_before: before.status.clone(),
                    status_after: after.status.clone(),
                    duration_delta_ms: after.duration_ms as i64 - before.duration_ms as i64,
                }),
                None => only_in_first.push(before.signal_name.clone()),
            }
        }
        let only_in_second: Vec<String> = second
            .signals
            .iter()
            .filter(|s| !first_names.contains_key(s.signal_name.as_str()))
            .map(|s| s.signal_name.clone())
            .collect();

        Self {
            final_state_change: (first.final_state != second.final_state)
                .then(|| (first.final_state.clone(), second.final_state.clone())),
            timed_out_change: (first.timed_out != second.timed_out)
                .then_some((first.timed_out, second.timed_out)),
            total_duration_delta_ms: second.total_duration_ms as i64
                - first.total_duration_ms as i64,
            signals,
            only_in_first,
            only_in_second,
        }
    }

    /// Whether the two runs classified identically (durations may
    /// drift).
    pub fn same_classification(&self) -> bool {
        self.final_state_change.is_none()
            && self.timed_out_change.is_none()
            && self.only_in_first.is_empty()
            && self.only_in_second.is_empty()
            && self.signals.iter().all(|s| !s.status_changed())
    }

    /// Signals that went from green to not-green.
    pub fn regressions(&self) -> Vec<&SignalDiff> {
        self.signals.iter().filter(|s| s.is_regression()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use ignition_types::{FinalState, RunResult, SignalError, SignalRecord};

    fn recording(records: Vec<SignalRecord>, final_state: FinalState) -> Recording {
        let total = records.iter().map(|r| r.completed_at).max().unwrap_or_default();
        Recording::from_result(&RunResult {
            signal_records: records,
            stage_results: None,
            total_duration: total,
            timed_out: false,
            final_state,
        })
    }

    fn ok(name: &str, end_ms: u64) -> SignalRecord {
        SignalRecord::succeeded(name, Duration::ZERO, Duration::from_millis(end_ms))
    }

    fn bad(name: &str, end_ms: u64) -> SignalRecord {
        SignalRecord::failed(
            name,
            Duration::ZERO,
            Duration::from_millis(end_ms),
            SignalError::other("boom"),
        )
    }

    #[test]
    fn identical_runs_have_the_same_classification() {
        let a = recording(vec![ok("db", 100), ok("cache", 50)], FinalState::Completed);
        let b = recording(vec![ok("db", 120), ok("cache", 45)], FinalState::Completed);

        let diff = RecordingDiff::between(&a, &b);
        assert!(diff.same_classification());
        assert_eq!(diff.signals[0].duration_delta_ms, 20);
        assert_eq!(diff.signals[1].duration_delta_ms, -5);
        assert!(diff.regressions().is_empty());
    }

    #[test]
    fn regressions_are_surfaced() {
        let a = recording(vec![ok("db", 100)], FinalState::Completed);
        let b = recording(vec![bad("db", 30)], FinalState::Failed);

        let diff = RecordingDiff::between(&a, &b);
        assert!(!diff.same_classification());
        assert_eq!(
            diff.final_state_change,
            Some((Some("Completed".into()), Some("Failed".into())))
        );
        let regressions = diff.regressions();
        assert_eq!(regressions.len(), 1);
        assert_eq!(regressions[0].name, "db");
    }

    #[test]
    fn disjoint_signal_sets_are_reported() {
        let a = recording(vec![ok("db", 100), ok("old", 10)], FinalState::Completed);
        let b = recording(vec![ok("db", 100), ok("new", 10)], FinalState::Completed);

        let diff = RecordingDiff::between(&a, &b);
        assert_eq!(diff.only_in_first, vec!["old"]);
        assert_eq!(diff.only_in_second, vec!["new"]);
        assert!(!diff.same_classification());
    }
}
