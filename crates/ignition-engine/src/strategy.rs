use std::time::Duration;

use ignition_types::IgnitionOptions;

use crate::signal::Signal;

/// The effective timeout choice for one signal evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutDecision {
    /// The deadline to arm, if any.
    pub deadline: Option<Duration>,
    /// Whether the deadline firing cancels the signal's scope, or merely
    /// records the timeout verdict while the operation keeps running.
    pub cancel_on_timeout: bool,
}

/// Pluggable per-signal timeout decision.
///
/// Contract: pure and deterministic — the same `(signal, options)` pair
/// must always produce the same decision. Called once per signal
/// evaluation, possibly from several tasks at once.
pub trait TimeoutStrategy: Send + Sync {
    fn decide(&self, signal: &Signal, options: &IgnitionOptions) -> TimeoutDecision;
}

/// Passes the signal's own deadline and the options' default through
/// unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTimeoutStrategy;

impl TimeoutStrategy for DefaultTimeoutStrategy {
    fn decide(&self, signal: &Signal, options: &IgnitionOptions) -> TimeoutDecision {
        TimeoutDecision {
            deadline: signal.deadline(),
            cancel_on_timeout: options.cancel_individual_on_timeout,
        }
    }
}

/// Upper-bounds every deadline, and imposes the bound on signals that
/// declared none.
#[derive(Clone, Copy, Debug)]
pub struct ClampTimeoutStrategy {
    pub max: Duration,
}

impl TimeoutStrategy for ClampTimeoutStrategy {
    fn decide(&self, signal: &Signal, options: &IgnitionOptions) -> TimeoutDecision {
        let deadline = match signal.deadline() {
            Some(own) => own.min(self.max),
            None => self.max,
        };
        TimeoutDecision {
            deadline: Some(deadline),
            cancel_on_timeout: options.cancel_individual_on_timeout,
        }
    }
}

/// Strips every per-signal deadline; only the global deadline applies.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTimeoutStrategy;

impl TimeoutStrategy for NoTimeoutStrategy {
    fn decide(&self, _signal: &Signal, _options: &IgnitionOptions) -> TimeoutDecision {
        TimeoutDecision {
            deadline: None,
            cancel_on_timeout: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(deadline: Option<Duration>) -> Signal {
        let s = Signal::from_fn("db", |_scope| async { Ok(()) });
        match deadline {
            Some(d) => s.with_deadline(d),
            None => s,
        }
    }

    #[test]
    fn default_strategy_passes_through() {
        let options = IgnitionOptions::new().cancel_individual_on_timeout(false);
        let decision = DefaultTimeoutStrategy.decide(&signal(Some(Duration::from_millis(100))), &options);
        assert_eq!(decision.deadline, Some(Duration::from_millis(100)));
        assert!(!decision.cancel_on_timeout);
    }

    #[test]
    fn default_strategy_leaves_deadlineless_signals_alone() {
        let decision = DefaultTimeoutStrategy.decide(&signal(None), &IgnitionOptions::default());
        assert_eq!(decision.deadline, None);
    }

    #[test]
    fn clamp_strategy_narrows_and_fills_in() {
        let clamp = ClampTimeoutStrategy { max: Duration::from_millis(200) };
        let options = IgnitionOptions::default();

        let narrowed = clamp.decide(&signal(Some(Duration::from_secs(5))), &options);
        assert_eq!(narrowed.deadline, Some(Duration::from_millis(200)));

        let kept = clamp.decide(&signal(Some(Duration::from_millis(50))), &options);
        assert_eq!(kept.deadline, Some(Duration::from_millis(50)));

        let filled = clamp.decide(&signal(None), &options);
        assert_eq!(filled.deadline, Some(Duration::from_millis(200)));
    }

    #[test]
    fn no_timeout_strategy_strips_deadlines() {
        let decision =
            NoTimeoutStrategy.decide(&signal(Some(Duration::from_millis(10))), &IgnitionOptions::default());
        assert_eq!(decision.deadline, None);
        assert!(!decision.cancel_on_timeout);
    }
}
