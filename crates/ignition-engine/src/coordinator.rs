use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;

use ignition_types::{
    ExecutionMode, FinalState, IgnitionOptions, RunResult, SignalStatus, StageResult,
};

use crate::error::IgnitionError;
use crate::executor::{
    ExecContext, RegisteredSignal, StageMeta, execute, finalize_unsettled,
};
use crate::graph::DependencyGraph;
use crate::ledger::RunLedger;
use crate::policy::IgnitionPolicy;
use crate::scope::{CancelCause, CancelScope};
use crate::stages::StagePlan;
use crate::strategy::TimeoutStrategy;

/// Evaluates a registered signal set exactly once and caches the verdict.
///
/// Built by [`crate::registrar::IgnitionRegistrar`]. The first
/// `run_all`/`get_result` call drives the run; every later call — from
/// any task — joins or observes the same cached [`RunResult`]. Terminal
/// lifecycle states are sticky.
pub struct IgnitionCoordinator {
    signals: Arc<Vec<RegisteredSignal>>,
    graph: Arc<DependencyGraph>,
    plan: Option<StagePlan>,
    stage_of: Arc<Vec<Option<u32>>>,
    options: Arc<IgnitionOptions>,
    strategy: Arc<dyn TimeoutStrategy>,
    policy: Arc<dyn IgnitionPolicy>,
    state: Mutex<FinalState>,
    result: OnceCell<Arc<RunResult>>,
}

impl std::fmt::Debug for IgnitionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnitionCoordinator").finish()
    }
}

impl IgnitionCoordinator {
    pub(crate) fn new(
        signals: Vec<RegisteredSignal>,
        graph: DependencyGraph,
        plan: Option<StagePlan>,
        stage_of: Vec<Option<u32>>,
        options: IgnitionOptions,
        strategy: Arc<dyn TimeoutStrategy>,
        policy: Arc<dyn IgnitionPolicy>,
    ) -> Self {
        Self {
            signals: Arc::new(signals),
            graph: Arc::new(graph),
            plan,
            stage_of: Arc::new(stage_of),
            options: Arc::new(options),
            strategy,
            policy,
            state: Mutex::new(FinalState::NotStarted),
            result: OnceCell::new(),
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> FinalState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Names of the registered signals, in registration order.
    pub fn signal_names(&self) -> Vec<String> {
        self.signals.iter().map(|s| s.signal.name().to_string()).collect()
    }

    /// Runs every signal (once) and returns the cached result.
    ///
    /// Raises only under the fail-fast rules, and only to the caller
    /// that drove the run; the result is cached before the error is
    /// returned, so re-invocation yields `Ok` with the same result.
    pub async fn run_all(
        &self,
        external: Option<CancellationToken>,
    ) -> Result<Arc<RunResult>, IgnitionError> {
        let (result, raised) = self.evaluate(external).await;
        match raised {
            Some(error) => Err(error),
            None => Ok(result),
        }
    }

    /// Returns the cached result, triggering the run when necessary.
    /// Never raises: failures live on the records.
    pub async fn get_result(&self) -> Arc<RunResult> {
        self.evaluate(None).await.0
    }

    async fn evaluate(
        &self,
        external: Option<CancellationToken>,
    ) -> (Arc<RunResult>, Option<IgnitionError>) {
        let mut raised: Option<IgnitionError> = None;
        let result = self
            .result
            .get_or_init(|| async {
                *self.state.lock().expect("state lock poisoned") = FinalState::Running;
                let (result, error) = self.drive(external).await;
                *self.state.lock().expect("state lock poisoned") = result.final_state;
                raised = error;
                Arc::new(result)
            })
            .await;
        (Arc::clone(result), raised)
    }

    /// The single evaluation: executes, enforces the global deadline,
    /// finalizes stragglers, and freezes the result.
    async fn drive(
        &self,
        external: Option<CancellationToken>,
    ) -> (RunResult, Option<IgnitionError>) {
        let started = tokio::time::Instant::now();
        let scope = match external {
            Some(token) => CancelScope::with_external(token),
            None => CancelScope::root(),
        };
        let ledger = Arc::new(RunLedger::new(self.signals.len(), self.options.execution_mode));
        let semaphore = match self.options.execution_mode {
            ExecutionMode::Sequential => None,
            _ => self.options.max_concurrency.map(|n| Arc::new(Semaphore::new(n))),
        };

        let ctx = Arc::new(ExecContext {
            signals: Arc::clone(&self.signals),
            graph: Arc::clone(&self.graph),
            options: Arc::clone(&self.options),
            strategy: Arc::clone(&self.strategy),
            policy: Arc::clone(&self.policy),
            ledger: Arc::clone(&ledger),
            started,
            scope: scope.clone(),
            semaphore,
            stage_of: Arc::clone(&self.stage_of),
            stage_meta: Arc::new(Mutex::new(BTreeMap::new())),
        });

        tracing::info!(
            signals = self.signals.len(),
            mode = %self.options.execution_mode,
            "ignition run starting"
        );

        {
            let exec = execute(&ctx, self.plan.as_ref());
            tokio::pin!(exec);
            let global = tokio::time::sleep(self.options.global_deadline);
            tokio::pin!(global);
            let mut deadline_elapsed = false;

            loop {
                tokio::select! {
                    biased;
                    () = &mut exec => break,
                    () = &mut global, if !deadline_elapsed => {
                        deadline_elapsed = true;
                        ledger.latch_global_deadline();
                        if self.options.cancel_on_global_deadline {
                            ledger.latch_timed_out();
                            scope.cancel(CancelCause::GlobalTimeout);
                            tracing::warn!("global deadline elapsed, cancelling run");
                        } else {
                            tracing::warn!("global deadline elapsed, letting signals finish");
                        }
                    }
                }
            }
        }

        finalize_unsettled(&ctx);

        let stage_meta: BTreeMap<u32, StageMeta> = ctx
            .stage_meta
            .lock()
            .expect("stage meta lock poisoned")
            .clone();
        let records = ledger.records();

        let stage_results = if self.options.execution_mode == ExecutionMode::Staged {
            let mut by_stage: BTreeMap<u32, Vec<_>> = BTreeMap::new();
            for record in &records {
                if let Some(stage) = record.stage {
                    by_stage.entry(stage).or_default().push(record.clone());
                }
            }
            Some(
                by_stage
                    .into_iter()
                    .map(|(number, stage_records)| {
                        let meta = stage_meta.get(&number);
                        StageResult::from_records(
                            number,
                            meta.map(|m| m.name.clone())
                                .unwrap_or_else(|| format!("stage-{number}")),
                            stage_records,
                            meta.map(|m| m.completed).unwrap_or(false),
                            meta.map(|m| m.promoted).unwrap_or(false),
                        )
                    })
                    .collect(),
            )
        } else {
            None
        };

        let timed_out =
            ledger.timed_out() || records.iter().any(|r| r.status == SignalStatus::TimedOut);
        let all_succeeded = records.iter().all(|r| r.status == SignalStatus::Succeeded);
        let final_state = if timed_out {
            FinalState::TimedOut
        } else if all_succeeded {
            FinalState::Completed
        } else {
            FinalState::Failed
        };

        let error = self.raise_decision(&ledger);

        let result = RunResult {
            signal_records: records,
            stage_results,
            total_duration: started.elapsed(),
            timed_out,
            final_state,
        };
        tracing::info!(
            state = %final_state,
            timed_out,
            duration_ms = result.total_duration.as_millis() as u64,
            "ignition run finished"
        );
        (result, error)
    }

    /// The fail-fast raise rules: sequential runs reraise the stopping
    /// verdict; concurrent runs aggregate the captured failures.
    fn raise_decision(&self, ledger: &RunLedger) -> Option<IgnitionError> {
        if !self.policy.raises_on_failure() {
            return None;
        }
        if self.options.execution_mode == ExecutionMode::Sequential {
            let stopping = ledger.first_unsuccessful()?;
            return match stopping.status {
                SignalStatus::Failed => stopping.failure.map(|source| IgnitionError::SignalFailed {
                    name: stopping.name,
                    source,
                }),
                SignalStatus::TimedOut => {
                    Some(IgnitionError::SignalTimedOut { name: stopping.name })
                }
                _ => None,
            };
        }
        let failures = ledger.failures();
        if failures.is_empty() {
            None
        } else {
            Some(IgnitionError::Aggregate { failures })
        }
    }
}
