use serde::{Deserialize, Serialize};

use crate::recording::RecordedSignal;

/// Aggregate statistics over a recording's signals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_signals: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub timed_out_count: usize,
    pub skipped_count: usize,
    pub cancelled_count: usize,
    /// Observed peak of concurrently running signals.
    pub max_concurrency: usize,
    pub slowest_signal_name: Option<String>,
    pub slowest_duration_ms: Option<u64>,
    pub fastest_signal_name: Option<String>,
    pub fastest_duration_ms: Option<u64>,
    pub average_duration_ms: f64,
}

/// Builds the summary in one pass plus the concurrency sweep.
///
/// Slowest/fastest/average consider only signals that actually ran;
/// skipped signals are zero-width by construction and would drown the
/// statistics.
pub fn compute_summary(signals: &[RecordedSignal]) -> RunSummary {
    let mut summary = RunSummary {
        total_signals: signals.len(),
        succeeded_count: 0,
        failed_count: 0,
        timed_out_count: 0,
        skipped_count: 0,
        cancelled_count: 0,
        max_concurrency: 0,
        slowest_signal_name: None,
        slowest_duration_ms: None,
        fastest_signal_name: None,
        fastest_duration_ms: None,
        average_duration_ms: 0.0,
    };

    let mut ran = 0usize;
    let mut duration_sum = 0u64;

    for signal in signals {
        match signal.status.as_str() {
            "Succeeded" => summary.succeeded_count += 1,
            "Failed" => summary.failed_count += 1,
            "TimedOut" => summary.timed_out_count += 1,
            "Skipped" => summary.skipped_count += 1,
            "Cancelled" => summary.cancelled_count += 1,
            _ => {}
        }
        if signal.status == "Skipped" {
            continue;
        }
        ran += 1;
        duration_sum += signal.duration_ms;
        if summary.slowest_duration_ms.is_none_or(|d| signal.duration_ms > d) {
            summary.slowest_duration_ms = Some(signal.duration_ms);
            summary.slowest_signal_name = Some(signal.signal_name.clone());
        }
        if summary.fastest_duration_ms.is_none_or(|d| signal.duration_ms < d) {
            summary.fastest_duration_ms = Some(signal.duration_ms);
            summary.fastest_signal_name = Some(signal.signal_name.clone());
        }
    }

    if ran > 0 {
        summary.average_duration_ms = duration_sum as f64 / ran as f64;
    }
    summary.max_concurrency = peak_concurrency(signals);
    summary
}

/// The observed concurrency peak: a timeline sweep of `+1` at each
/// `start_ms` and `-1` at each `end_ms`, ordered first by time then by
/// delta, so an end and a start at the same millisecond do not
/// double-count.
pub fn peak_concurrency(signals: &[RecordedSignal]) -> usize {
    let mut events: Vec<(u64, i32)> = Vec::with_capacity(signals.len() * 2);
    for signal in signals {
        if signal.status == "Skipped" {
            continue;
        }
        events.push((signal.start_ms, 1));
        events.push((signal.end_ms, -1));
    }
    events.sort_by_key(|&(time, delta)| (time, delta));

    let mut current = 0i32;
    let mut peak = 0i32;
    for (_, delta) in events {
        current += delta;
        peak = peak.max(current);
    }
    peak.max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(name: &str, status: &str, start_ms: u64, end_ms: u64) -> RecordedSignal {
        RecordedSignal {
            signal_name: name.to_string(),
            status: status.to_string(),
            start_ms,
            end_ms,
            duration_ms: end_ms - start_ms,
            stage: None,
            dependencies: None,
            failed_dependencies: None,
            cancellation_reason: None,
            cancelled_by_signal: None,
            exception_type: None,
            exception_message: None,
        }
    }

    #[test]
    fn counts_and_extremes_are_computed() {
        let signals = vec![
            signal("a", "Succeeded", 0, 100),
            signal("b", "Failed", 0, 40),
            signal("c", "Skipped", 40, 40),
        ];
        let summary = compute_summary(&signals);

        assert_eq!(summary.total_signals, 3);
        assert_eq!(summary.succeeded_count, 1);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.slowest_signal_name.as_deref(), Some("a"));
        assert_eq!(summary.slowest_duration_ms, Some(100));
        assert_eq!(summary.fastest_signal_name.as_deref(), Some("b"));
        assert_eq!(summary.fastest_duration_ms, Some(40));
        assert!((summary.average_duration_ms - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_run_summarizes_to_zeroes() {
        let summary = compute_summary(&[]);
        assert_eq!(summary.total_signals, 0);
        assert_eq!(summary.max_concurrency, 0);
        assert_eq!(summary.slowest_signal_name, None);
        assert_eq!(summary.average_duration_ms, 0.0);
    }

    #[test]
    fn overlapping_signals_raise_the_peak() {
        let signals = vec![
            signal("a", "Succeeded", 0, 100),
            signal("b", "Succeeded", 10, 60),
            signal("c", "Succeeded", 20, 30),
        ];
        assert_eq!(peak_concurrency(&signals), 3);
    }

    #[test]
    fn back_to_back_signals_do_not_double_count() {
        // b starts at the exact millisecond a ends; the -1 sorts first.
        let signals = vec![
            signal("a", "Succeeded", 0, 50),
            signal("b", "Succeeded", 50, 90),
        ];
        assert_eq!(peak_concurrency(&signals), 1);
    }

    #[test]
    fn skipped_signals_do_not_enter_the_sweep() {
        let signals = vec![
            signal("a", "Succeeded", 0, 50),
            signal("b", "Skipped", 10, 10),
        ];
        assert_eq!(peak_concurrency(&signals), 1);
    }
}
