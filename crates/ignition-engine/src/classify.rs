use ignition_types::{CancellationReason, SignalError, SignalStatus};

use crate::scope::CancelCause;

/// What the executor observed when a signal's evaluation settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RawOutcome {
    /// The operation returned `Ok`.
    Completed,
    /// The operation returned an error.
    Faulted(SignalError),
    /// The evaluation ended because the signal's scope was cancelled
    /// before the operation settled.
    Cancelled,
}

/// The classified verdict for one signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Verdict {
    pub status: SignalStatus,
    pub reason: Option<CancellationReason>,
    pub cancelled_by: Option<String>,
    /// The failure cause, retained verbatim when the operation faulted.
    pub failure: Option<SignalError>,
}

impl Verdict {
    fn new(status: SignalStatus) -> Self {
        Self {
            status,
            reason: None,
            cancelled_by: None,
            failure: None,
        }
    }

    fn with_reason(mut self, reason: CancellationReason) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// Maps a raw completion event to a status.
///
/// `cause` is the effective cancellation cause of the signal's scope at
/// settlement time; `deadline_elapsed` is whether the signal's own soft
/// deadline fired earlier. Deterministic: no clock, no state.
///
/// A soft per-signal deadline freezes the verdict at `TimedOut` — a
/// later completion (successful or not) only contributes its timing and,
/// for faults, the retained cause.
pub(crate) fn classify(raw: RawOutcome, cause: Option<CancelCause>, deadline_elapsed: bool) -> Verdict {
    // Cooperative unwinds count as cancellations when a cause exists;
    // without one the operation aborted itself, which is a fault.
    let cancelled = match &raw {
        RawOutcome::Cancelled => true,
        RawOutcome::Faulted(error) => error.is_cancellation() && cause.is_some(),
        RawOutcome::Completed => false,
    };

    if cancelled {
        if deadline_elapsed {
            return Verdict::new(SignalStatus::TimedOut).with_reason(CancellationReason::PerSignalTimeout);
        }
        return match cause {
            Some(CancelCause::PerSignalTimeout) => {
                Verdict::new(SignalStatus::TimedOut).with_reason(CancellationReason::PerSignalTimeout)
            }
            Some(CancelCause::GlobalTimeout) => {
                Verdict::new(SignalStatus::TimedOut).with_reason(CancellationReason::GlobalTimeout)
            }
            Some(CancelCause::DependencyFailed { origin }) => {
                let mut verdict =
                    Verdict::new(SignalStatus::Cancelled).with_reason(CancellationReason::DependencyFailed);
                verdict.cancelled_by = Some(origin);
                verdict
            }
            Some(CancelCause::PolicyStop) => {
                Verdict::new(SignalStatus::Cancelled).with_reason(CancellationReason::PolicyStop)
            }
            Some(CancelCause::External) | None => {
                Verdict::new(SignalStatus::Cancelled).with_reason(CancellationReason::ExternalCancel)
            }
        };
    }

    if deadline_elapsed {
        let mut verdict =
            Verdict::new(SignalStatus::TimedOut).with_reason(CancellationReason::PerSignalTimeout);
        if let RawOutcome::Faulted(error) = raw {
            verdict.failure = Some(error);
        }
        return verdict;
    }

    match raw {
        RawOutcome::Completed => Verdict::new(SignalStatus::Succeeded),
        RawOutcome::Faulted(error) => {
            let mut verdict = Verdict::new(SignalStatus::Failed);
            verdict.failure = Some(error);
            verdict
        }
        // Unreachable: handled by the cancellation arm above.
        RawOutcome::Cancelled => Verdict::new(SignalStatus::Cancelled),
    }
}
