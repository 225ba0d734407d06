use serde::{Deserialize, Serialize};

/// Classification of one readiness signal's outcome.
///
/// Every registered signal ends a run with exactly one of these. All five
/// are terminal for the signal; only the run-level [`FinalState`] has
/// non-terminal phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalStatus {
    /// The operation completed without error, within its deadline.
    Succeeded,
    /// The operation produced a non-cancellation failure.
    Failed,
    /// A per-signal or global deadline elapsed before the operation settled.
    TimedOut,
    /// Never started: a prerequisite ended badly or a policy stopped the run.
    Skipped,
    /// The operation was cancelled for a reason other than a deadline.
    Cancelled,
}

impl SignalStatus {
    /// Returns the variant name as a static string for recordings and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::TimedOut => "TimedOut",
            Self::Skipped => "Skipped",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Whether this outcome counts toward readiness.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignalStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Succeeded" => Ok(Self::Succeeded),
            "Failed" => Ok(Self::Failed),
            "TimedOut" => Ok(Self::TimedOut),
            "Skipped" => Ok(Self::Skipped),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownVariant {
                kind: "SignalStatus",
                value: other.to_string(),
            }),
        }
    }
}

/// Why the coordinator (or an external caller) cancelled a signal.
///
/// Absent on a record when no cancellation was involved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancellationReason {
    /// The run's global deadline elapsed with hard cancellation enabled.
    GlobalTimeout,
    /// The signal's own deadline elapsed with cancel-on-timeout enabled.
    PerSignalTimeout,
    /// A prerequisite signal ended in a non-success status.
    DependencyFailed,
    /// A policy returned `false` and stopped the run.
    PolicyStop,
    /// The cancellation token passed into `run_all` fired.
    ExternalCancel,
}

impl CancellationReason {
    /// Returns the variant name as a static string for recordings and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GlobalTimeout => "GlobalTimeout",
            Self::PerSignalTimeout => "PerSignalTimeout",
            Self::DependencyFailed => "DependencyFailed",
            Self::PolicyStop => "PolicyStop",
            Self::ExternalCancel => "ExternalCancel",
        }
    }
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CancellationReason {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GlobalTimeout" => Ok(Self::GlobalTimeout),
            "PerSignalTimeout" => Ok(Self::PerSignalTimeout),
            "DependencyFailed" => Ok(Self::DependencyFailed),
            "PolicyStop" => Ok(Self::PolicyStop),
            "ExternalCancel" => Ok(Self::ExternalCancel),
            other => Err(UnknownVariant {
                kind: "CancellationReason",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle state of a coordinator run.
///
/// ```text
/// NotStarted ──run_all──> Running ──> Completed | Failed | TimedOut
/// ```
///
/// Terminal states are sticky: once reached, every later observation sees
/// the same state and the cached result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalState {
    NotStarted,
    Running,
    /// Terminal: every signal succeeded within the deadlines.
    Completed,
    /// Terminal: at least one signal failed and none timed out.
    Failed,
    /// Terminal: the global deadline fired hard, or a signal timed out.
    TimedOut,
}

impl FinalState {
    /// Whether the run has finished evaluating.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    /// Returns the variant name as a static string for recordings and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::TimedOut => "TimedOut",
        }
    }
}

impl std::fmt::Display for FinalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FinalState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NotStarted" => Ok(Self::NotStarted),
            "Running" => Ok(Self::Running),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "TimedOut" => Ok(Self::TimedOut),
            other => Err(UnknownVariant {
                kind: "FinalState",
                value: other.to_string(),
            }),
        }
    }
}

/// Parse error for the string forms used in recordings.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} variant `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_status_round_trips_through_strings() {
        for status in [
            SignalStatus::Succeeded,
            SignalStatus::Failed,
            SignalStatus::TimedOut,
            SignalStatus::Skipped,
            SignalStatus::Cancelled,
        ] {
            let parsed: SignalStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn cancellation_reason_round_trips_through_strings() {
        for reason in [
            CancellationReason::GlobalTimeout,
            CancellationReason::PerSignalTimeout,
            CancellationReason::DependencyFailed,
            CancellationReason::PolicyStop,
            CancellationReason::ExternalCancel,
        ] {
            let parsed: CancellationReason = reason.as_str().parse().unwrap();
            assert_eq!(parsed, reason);
        }
    }

    #[test]
    fn only_settled_final_states_are_terminal() {
        assert!(!FinalState::NotStarted.is_terminal());
        assert!(!FinalState::Running.is_terminal());
        assert!(FinalState::Completed.is_terminal());
        assert!(FinalState::Failed.is_terminal());
        assert!(FinalState::TimedOut.is_terminal());
    }

    #[test]
    fn unknown_variant_parse_reports_kind_and_value() {
        let err = "Exploded".parse::<SignalStatus>().unwrap_err();
        assert_eq!(err.kind, "SignalStatus");
        assert_eq!(err.value, "Exploded");
        assert_eq!(err.to_string(), "unknown SignalStatus variant `Exploded`");
    }
}
