use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a batch of signals is scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Start everything immediately, bounded by `max_concurrency`.
    Parallel,
    /// Registration order, one at a time; `max_concurrency` is ignored.
    Sequential,
    /// Ready-queue scheduling over the dependency graph.
    DependencyAware,
    /// Iterate the stage plan; each stage runs in its own mode.
    Staged,
}

impl ExecutionMode {
    /// Returns the variant name as a static string for recordings and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parallel => "Parallel",
            Self::Sequential => "Sequential",
            Self::DependencyAware => "DependencyAware",
            Self::Staged => "Staged",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How stage boundaries react to the outcomes inside a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagePolicyKind {
    /// Proceed only when every stage signal succeeded; otherwise skip the rest.
    AllMustSucceed,
    /// Always proceed to the next stage.
    BestEffort,
    /// Stop at the first failed signal; in-flight signals still finish.
    FailFast,
    /// Begin the next stage once the succeeded ratio reaches the threshold.
    EarlyPromotion,
}

impl StagePolicyKind {
    /// Returns the variant name as a static string for recordings and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllMustSucceed => "AllMustSucceed",
            Self::BestEffort => "BestEffort",
            Self::FailFast => "FailFast",
            Self::EarlyPromotion => "EarlyPromotion",
        }
    }
}

impl std::fmt::Display for StagePolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-wide configuration for a coordinator.
///
/// Fluent setters, then [`Self::validate`] before use; the registrar calls
/// `validate` at build time so violations surface as configuration errors,
/// never from `run_all`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IgnitionOptions {
    /// Upper bound on the whole run. Must be positive.
    pub global_deadline: Duration,
    /// `true` cancels the coordinator scope when the global deadline fires;
    /// `false` lets pending signals finish and only records late completions.
    pub cancel_on_global_deadline: bool,
    /// Default cancel-on-timeout choice when the timeout strategy does not
    /// override it per signal.
    pub cancel_individual_on_timeout: bool,
    /// Scheduling algorithm for the run.
    pub execution_mode: ExecutionMode,
    /// Concurrent-signal cap. `None` means unbounded. Ignored in
    /// [`ExecutionMode::Sequential`]. Must be positive when present.
    pub max_concurrency: Option<usize>,
    /// Stage-boundary behavior for [`ExecutionMode::Staged`].
    pub stage_policy: StagePolicyKind,
    /// Succeeded-ratio threshold for [`StagePolicyKind::EarlyPromotion`].
    /// Must lie in `[0, 1]`.
    pub early_promotion_threshold: f64,
    /// Whether a failed signal cancels its transitive dependents (instead
    /// of merely skipping them) in dependency-aware execution.
    pub cancel_dependents_on_failure: bool,
}

impl Default for IgnitionOptions {
    fn default() -> Self {
        Self {
            global_deadline: Duration::from_secs(30),
            cancel_on_global_deadline: false,
            cancel_individual_on_timeout: true,
            execution_mode: ExecutionMode::Parallel,
            max_concurrency: None,
            stage_policy: StagePolicyKind::AllMustSucceed,
            early_promotion_threshold: 1.0,
            cancel_dependents_on_failure: false,
        }
    }
}

impl IgnitionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global_deadline(mut self, deadline: Duration) -> Self {
        self.global_deadline = deadline;
        self
    }

    pub fn cancel_on_global_deadline(mut self, cancel: bool) -> Self {
        self.cancel_on_global_deadline = cancel;
        self
    }

    pub fn cancel_individual_on_timeout(mut self, cancel: bool) -> Self {
        self.cancel_individual_on_timeout = cancel;
        self
    }

    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn max_concurrency(mut self, cap: usize) -> Self {
        self.max_concurrency = Some(cap);
        self
    }

    pub fn stage_policy(mut self, policy: StagePolicyKind) -> Self {
        self.stage_policy = policy;
        self
    }

    pub fn early_promotion_threshold(mut self, threshold: f64) -> Self {
        self.early_promotion_threshold = threshold;
        self
    }

    pub fn cancel_dependents_on_failure(mut self, cancel: bool) -> Self {
        self.cancel_dependents_on_failure = cancel;
        self
    }

    /// Checks every field constraint, returning the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global_deadline.is_zero() {
            return Err(ConfigError::NonPositiveGlobalDeadline);
        }
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::NonPositiveConcurrency);
        }
        if !(0.0..=1.0).contains(&self.early_promotion_threshold) {
            return Err(ConfigError::ThresholdOutOfRange {
                value: self.early_promotion_threshold,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(IgnitionOptions::default().validate().is_ok());
    }

    #[test]
    fn zero_global_deadline_is_rejected() {
        let options = IgnitionOptions::new().global_deadline(Duration::ZERO);
        assert_eq!(options.validate(), Err(ConfigError::NonPositiveGlobalDeadline));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let options = IgnitionOptions::new().max_concurrency(0);
        assert_eq!(options.validate(), Err(ConfigError::NonPositiveConcurrency));
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let options = IgnitionOptions::new().early_promotion_threshold(1.5);
        assert!(matches!(
            options.validate(),
            Err(ConfigError::ThresholdOutOfRange { .. })
        ));
    }

    #[test]
    fn fluent_setters_compose() {
        let options = IgnitionOptions::new()
            .execution_mode(ExecutionMode::DependencyAware)
            .max_concurrency(4)
            .cancel_dependents_on_failure(true);
        assert_eq!(options.execution_mode, ExecutionMode::DependencyAware);
        assert_eq!(options.max_concurrency, Some(4));
        assert!(options.cancel_dependents_on_failure);
        assert!(options.validate().is_ok());
    }
}
