use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ignition_types::{ConfigError, ExecutionMode, IgnitionOptions, SignalError};

use crate::coordinator::IgnitionCoordinator;
use crate::executor::RegisteredSignal;
use crate::graph::DependencyGraph;
use crate::policy::{BestEffort, IgnitionPolicy};
use crate::scope::CancelScope;
use crate::signal::Signal;
use crate::stages::StagePlan;
use crate::strategy::{DefaultTimeoutStrategy, TimeoutStrategy};

/// The registration surface: collects signals, graph edges, the stage
/// plan, options, strategy, and policy, then builds a coordinator.
///
/// Name and deadline violations surface at the `register*` call; graph,
/// stage, and option violations at [`Self::build`]. `run_all` never
/// reports configuration problems.
pub struct IgnitionRegistrar {
    signals: Vec<Signal>,
    names: HashSet<String>,
    edges: Vec<(String, String)>,
    plan: Option<StagePlan>,
    options: IgnitionOptions,
    strategy: Arc<dyn TimeoutStrategy>,
    policy: Arc<dyn IgnitionPolicy>,
}

impl std::fmt::Debug for IgnitionRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnitionRegistrar").finish()
    }
}

impl Default for IgnitionRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

impl IgnitionRegistrar {
    pub fn new() -> Self {
        Self {
            signals: Vec::new(),
            names: HashSet::new(),
            edges: Vec::new(),
            plan: None,
            options: IgnitionOptions::default(),
            strategy: Arc::new(DefaultTimeoutStrategy),
            policy: Arc::new(BestEffort),
        }
    }

    /// Registers a signal from an async closure.
    pub fn register<F, Fut>(self, name: impl Into<String>, operation: F) -> Result<Self, ConfigError>
    where
        F: Fn(CancelScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SignalError>> + Send + 'static,
    {
        self.register_signal(Signal::from_fn(name, operation))
    }

    /// Registers a signal with a per-signal deadline.
    pub fn register_with_deadline<F, Fut>(
        self,
        name: impl Into<String>,
        deadline: Duration,
        operation: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(CancelScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SignalError>> + Send + 'static,
    {
        self.register_signal(Signal::from_fn(name, operation).with_deadline(deadline))
    }

    /// Registers a prebuilt [`Signal`] (trait-object operations).
    pub fn register_signal(mut self, signal: Signal) -> Result<Self, ConfigError> {
        if signal.name().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if !self.names.insert(signal.name().to_string()) {
            return Err(ConfigError::DuplicateName {
                name: signal.name().to_string(),
            });
        }
        if signal.deadline() == Some(Duration::ZERO) {
            return Err(ConfigError::NonPositiveDeadline {
                name: signal.name().to_string(),
            });
        }
        self.signals.push(signal);
        Ok(self)
    }

    /// Adds `(signal, prerequisite)` edges. Validated at [`Self::build`],
    /// since prerequisites may be registered after their dependents.
    pub fn register_graph<I, A, B>(mut self, edges: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        self.edges
            .extend(edges.into_iter().map(|(a, b)| (a.into(), b.into())));
        self
    }

    /// Installs the stage plan. Validated at [`Self::build`].
    pub fn configure_stages(mut self, plan: StagePlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn set_options(mut self, options: IgnitionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn set_timeout_strategy(mut self, strategy: Arc<dyn TimeoutStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn set_policy(mut self, policy: Arc<dyn IgnitionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Validates everything and freezes the registration into a
    /// coordinator.
    pub fn build(self) -> Result<IgnitionCoordinator, ConfigError> {
        self.options.validate()?;

        let names: Vec<String> = self.signals.iter().map(|s| s.name().to_string()).collect();
        let graph = DependencyGraph::build(names.clone(), &self.edges)?;

        let plan = match (self.plan, self.options.execution_mode) {
            (Some(plan), _) => {
                plan.validate(&names)?;
                let assigned = plan.assignment();
                let unassigned: Vec<String> = names
                    .iter()
                    .filter(|n| !assigned.contains_key(*n))
                    .cloned()
                    .collect();
                Some(plan.with_defaulted(unassigned))
            }
            // Staged mode without a plan: everything lands in stage 0.
            (None, ExecutionMode::Staged) => Some(StagePlan::default().with_defaulted(names.clone())),
            (None, _) => None,
        };

        let stage_of: Vec<Option<u32>> = match &plan {
            Some(plan) => {
                let assignment = plan.assignment();
                names.iter().map(|n| assignment.get(n).copied()).collect()
            }
            None => vec![None; names.len()],
        };

        let entries: Vec<RegisteredSignal> =
            self.signals.into_iter().map(RegisteredSignal::new).collect();

        Ok(IgnitionCoordinator::new(
            entries,
            graph,
            plan,
            stage_of,
            self.options,
            self.strategy,
            self.policy,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::Stage;

    #[test]
    fn empty_name_is_rejected_immediately() {
        let err = IgnitionRegistrar::new()
            .register("", |_scope| async { Ok(()) })
            .unwrap_err();
        assert_eq!(err, ConfigError::EmptyName);
    }

    #[test]
    fn duplicate_name_is_rejected_immediately() {
        let err = IgnitionRegistrar::new()
            .register("db", |_scope| async { Ok(()) })
            .unwrap()
            .register("db", |_scope| async { Ok(()) })
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateName { name: "db".into() });
    }

    #[test]
    fn zero_deadline_is_rejected_immediately() {
        let err = IgnitionRegistrar::new()
            .register_with_deadline("db", Duration::ZERO, |_scope| async { Ok(()) })
            .unwrap_err();
        assert_eq!(err, ConfigError::NonPositiveDeadline { name: "db".into() });
    }

    #[test]
    fn invalid_options_surface_at_build() {
        let err = IgnitionRegistrar::new()
            .register("db", |_scope| async { Ok(()) })
            .unwrap()
            .set_options(IgnitionOptions::new().max_concurrency(0))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::NonPositiveConcurrency);
    }

    #[test]
    fn graph_errors_surface_at_build() {
        let err = IgnitionRegistrar::new()
            .register("a", |_scope| async { Ok(()) })
            .unwrap()
            .register_graph([("a", "ghost")])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDependency { .. }));
    }

    #[test]
    fn stage_plan_errors_surface_at_build() {
        let err = IgnitionRegistrar::new()
            .register("a", |_scope| async { Ok(()) })
            .unwrap()
            .configure_stages(StagePlan::new(vec![
                Stage::new(0, "s", ExecutionMode::Parallel).with_signals(["ghost"]),
            ]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStageSignal { .. }));
    }

    #[test]
    fn staged_mode_without_a_plan_defaults_everything_to_stage_zero() {
        let coordinator = IgnitionRegistrar::new()
            .register("a", |_scope| async { Ok(()) })
            .unwrap()
            .register("b", |_scope| async { Ok(()) })
            .unwrap()
            .set_options(IgnitionOptions::new().execution_mode(ExecutionMode::Staged))
            .build()
            .unwrap();
        assert_eq!(coordinator.signal_names(), vec!["a", "b"]);
    }

    #[test]
    fn unstaged_signals_join_stage_zero() {
        let coordinator = IgnitionRegistrar::new()
            .register("a", |_scope| async { Ok(()) })
            .unwrap()
            .register("b", |_scope| async { Ok(()) })
            .unwrap()
            .configure_stages(StagePlan::new(vec![
                Stage::new(1, "late", ExecutionMode::Parallel).with_signals(["a"]),
            ]))
            .set_options(IgnitionOptions::new().execution_mode(ExecutionMode::Staged))
            .build()
            .unwrap();
        // `b` was never staged explicitly; the build assigned it to 0.
        assert_eq!(coordinator.signal_names(), vec!["a", "b"]);
    }
}
