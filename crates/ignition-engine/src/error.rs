use ignition_types::SignalError;

/// Failures `run_all` raises under the fail-fast rules.
///
/// These surface only to the caller that drove the run; the finalized
/// result is cached first, so later callers observe the same result
/// without re-experiencing the error. Timeout and cancellation events
/// are otherwise classified into records, never raised.
#[derive(Debug, thiserror::Error)]
pub enum IgnitionError {
    /// Sequential fail-fast: the first failure, reraised verbatim.
    #[error("signal `{name}` failed: {source}")]
    SignalFailed {
        name: String,
        #[source]
        source: SignalError,
    },

    /// Sequential fail-fast: the run stopped on a deadline verdict.
    #[error("signal `{name}` timed out")]
    SignalTimedOut { name: String },

    /// Concurrent fail-fast: every captured failure, in completion order.
    #[error("{} signal(s) failed during ignition", failures.len())]
    Aggregate { failures: Vec<(String, SignalError)> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_display_counts_failures() {
        let err = IgnitionError::Aggregate {
            failures: vec![
                ("db".into(), SignalError::other("boom")),
                ("cache".into(), SignalError::other("bang")),
            ],
        };
        assert_eq!(err.to_string(), "2 signal(s) failed during ignition");
    }

    #[test]
    fn signal_failed_chains_the_source() {
        let err = IgnitionError::SignalFailed {
            name: "db".into(),
            source: SignalError::other("boom"),
        };
        assert_eq!(err.to_string(), "signal `db` failed: Other: boom");
        assert!(std::error::Error::source(&err).is_some());
    }
}
