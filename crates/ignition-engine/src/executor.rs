use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use ignition_types::{
    CancellationReason, ExecutionMode, IgnitionOptions, SignalError, SignalRecord, SignalStatus,
    StagePolicyKind,
};

use crate::classify::{RawOutcome, Verdict, classify};
use crate::graph::DependencyGraph;
use crate::ledger::RunLedger;
use crate::policy::IgnitionPolicy;
use crate::scope::{CancelCause, CancelScope};
use crate::signal::{MemoizedIgnition, Signal};
use crate::stages::{Stage, StagePlan};
use crate::strategy::TimeoutStrategy;

/// A registered signal together with its one-shot execution handle.
pub(crate) struct RegisteredSignal {
    pub(crate) signal: Signal,
    pub(crate) memo: MemoizedIgnition,
}

impl RegisteredSignal {
    pub(crate) fn new(signal: Signal) -> Self {
        let memo = MemoizedIgnition::new(signal.operation());
        Self { signal, memo }
    }
}

/// Per-stage execution bookkeeping collected while stages run.
#[derive(Clone, Debug)]
pub(crate) struct StageMeta {
    pub(crate) name: String,
    pub(crate) promoted: bool,
    pub(crate) completed: bool,
}

/// Everything one batch execution needs, shared across spawned tasks.
///
/// Cloning is shallow; staged execution clones with a derived scope so
/// the cancellation tree is coordinator scope → stage scope → signal
/// scope.
#[derive(Clone)]
pub(crate) struct ExecContext {
    pub(crate) signals: Arc<Vec<RegisteredSignal>>,
    pub(crate) graph: Arc<DependencyGraph>,
    pub(crate) options: Arc<IgnitionOptions>,
    pub(crate) strategy: Arc<dyn TimeoutStrategy>,
    pub(crate) policy: Arc<dyn IgnitionPolicy>,
    pub(crate) ledger: Arc<RunLedger>,
    pub(crate) started: tokio::time::Instant,
    pub(crate) scope: CancelScope,
    pub(crate) semaphore: Option<Arc<Semaphore>>,
    pub(crate) stage_of: Arc<Vec<Option<u32>>>,
    pub(crate) stage_meta: Arc<Mutex<BTreeMap<u32, StageMeta>>>,
}

impl ExecContext {
    /// Monotonic offset from run start.
    pub(crate) fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn with_scope(&self, scope: CancelScope) -> Self {
        let mut ctx = self.clone();
        ctx.scope = scope;
        ctx
    }

    fn name(&self, index: usize) -> &str {
        self.signals[index].signal.name()
    }

    /// Attaches stage and dependency context to a freshly built record.
    fn decorate(&self, index: usize, mut record: SignalRecord) -> SignalRecord {
        record = record.with_dependencies(self.graph.dependency_names(index));
        if let Some(stage) = self.stage_of[index] {
            record = record.with_stage(stage);
        }
        record
    }

    fn record_stage_meta(&self, number: u32, meta: StageMeta) {
        self.stage_meta
            .lock()
            .expect("stage meta lock poisoned")
            .insert(number, meta);
    }
}

fn raw_outcome(result: Result<(), SignalError>) -> RawOutcome {
    match result {
        Ok(()) => RawOutcome::Completed,
        Err(error) => RawOutcome::Faulted(error),
    }
}

fn record_from_verdict(
    name: &str,
    started_at: Duration,
    completed_at: Duration,
    verdict: Verdict,
) -> SignalRecord {
    let Verdict {
        status,
        reason,
        cancelled_by,
        failure,
    } = verdict;
    let mut record = match status {
        SignalStatus::Succeeded => SignalRecord::succeeded(name, started_at, completed_at),
        SignalStatus::Failed => SignalRecord::failed(
            name,
            started_at,
            completed_at,
            failure.unwrap_or_else(|| SignalError::other("operation failed without a cause")),
        ),
        SignalStatus::TimedOut => {
            let mut r = SignalRecord::timed_out(
                name,
                started_at,
                completed_at,
                reason.unwrap_or(CancellationReason::PerSignalTimeout),
            );
            if let Some(f) = failure {
                r = r.with_failure(f);
            }
            r
        }
        SignalStatus::Cancelled => SignalRecord::cancelled(
            name,
            started_at,
            completed_at,
            reason.unwrap_or(CancellationReason::ExternalCancel),
        ),
        SignalStatus::Skipped => SignalRecord::skipped(name, completed_at, reason),
    };
    if let Some(origin) = cancelled_by {
        record = record.with_cancelled_by(origin);
    }
    record
}

/// Evaluates one signal: timeout decision, derived scope, deadline
/// enforcement, classification, and the ledger funnel.
pub(crate) async fn run_signal(ctx: &ExecContext, index: usize) {
    let entry = &ctx.signals[index];
    let name = entry.signal.name();
    let decision = ctx.strategy.decide(&entry.signal, &ctx.options);
    let scope = ctx.scope.child();

    let started_at = ctx.now();
    ctx.ledger.mark_started(index, started_at);
    tracing::debug!(signal = name, "igniting");

    let op = entry.memo.ignite(scope.clone());
    tokio::pin!(op);

    let mut deadline_elapsed = false;
    let raw = match decision.deadline {
        Some(deadline) => {
            let sleep = tokio::time::sleep(deadline);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    biased;
                    out = &mut op => break raw_outcome(out),
                    () = scope.cancelled() => break RawOutcome::Cancelled,
                    () = &mut sleep, if !deadline_elapsed => {
                        if decision.cancel_on_timeout {
                            scope.cancel(CancelCause::PerSignalTimeout);
                            break RawOutcome::Cancelled;
                        }
                        // Soft deadline: verdict is frozen, the operation
                        // keeps running until it settles on its own.
                        deadline_elapsed = true;
                        ctx.ledger.latch_timed_out();
                        tracing::warn!(signal = name, "deadline elapsed, operation left running");
                    }
                }
            }
        }
        None => {
            tokio::select! {
                biased;
                out = &mut op => raw_outcome(out),
                () = scope.cancelled() => RawOutcome::Cancelled,
            }
        }
    };

    let completed_at = ctx.now();
    let verdict = classify(raw, scope.cause(), deadline_elapsed);
    tracing::debug!(signal = name, status = %verdict.status.as_str(), "settled");

    let record = ctx.decorate(index, record_from_verdict(name, started_at, completed_at, verdict));
    ctx.ledger
        .complete(index, record, ctx.policy.as_ref(), completed_at);
}

/// Zero-width record for a signal stopped before it started.
fn skip_record(ctx: &ExecContext, index: usize, reason: Option<CancellationReason>) -> SignalRecord {
    let at = ctx.now();
    ctx.decorate(index, SignalRecord::skipped(ctx.name(index), at, reason))
}

enum Admission {
    Admitted(Option<OwnedSemaphorePermit>),
    Cancelled,
}

/// Waits for a concurrency permit, giving up when the scope cancels.
async fn admit(ctx: &ExecContext) -> Admission {
    match &ctx.semaphore {
        None => Admission::Admitted(None),
        Some(semaphore) => {
            tokio::select! {
                biased;
                permit = Arc::clone(semaphore).acquire_owned() => match permit {
                    Ok(permit) => Admission::Admitted(Some(permit)),
                    Err(_) => Admission::Cancelled,
                },
                () = ctx.scope.cancelled() => Admission::Cancelled,
            }
        }
    }
}

/// Parallel mode: starts the batch in registration order, bounded by the
/// fair semaphore, and lets completions classify as they land.
pub(crate) async fn run_parallel(ctx: &Arc<ExecContext>, batch: &[usize]) {
    let mut tasks: JoinSet<()> = JoinSet::new();
    for &index in batch {
        if ctx.ledger.is_recorded(index) {
            continue;
        }
        if ctx.scope.is_cancelled() {
            break;
        }
        if ctx.ledger.stopped() {
            ctx.ledger
                .record_skip(index, skip_record(ctx, index, Some(CancellationReason::PolicyStop)));
            continue;
        }
        let permit = match admit(ctx).await {
            Admission::Admitted(permit) => permit,
            Admission::Cancelled => break,
        };
        // The stop latch may have flipped while waiting for a permit.
        if ctx.ledger.stopped() {
            ctx.ledger
                .record_skip(index, skip_record(ctx, index, Some(CancellationReason::PolicyStop)));
            continue;
        }
        let ctx = Arc::clone(ctx);
        tasks.spawn(async move {
            let _permit = permit;
            run_signal(&ctx, index).await;
        });
    }
    while tasks.join_next().await.is_some() {}
}

/// Sequential mode: registration order, full settlement before the next
/// start; the concurrency cap does not apply.
pub(crate) async fn run_sequential(ctx: &Arc<ExecContext>, batch: &[usize]) {
    for &index in batch {
        if ctx.ledger.is_recorded(index) {
            continue;
        }
        if ctx.scope.is_cancelled() {
            break;
        }
        if ctx.ledger.stopped() {
            ctx.ledger
                .record_skip(index, skip_record(ctx, index, Some(CancellationReason::PolicyStop)));
            continue;
        }
        run_signal(ctx, index).await;
    }
}

/// Dependency-aware mode: ready-queue scheduling seeded from the graph's
/// roots, with failure propagation to transitive dependents.
pub(crate) async fn run_dependency_aware(ctx: &Arc<ExecContext>, batch: &[usize]) {
    let members: HashSet<usize> = batch.iter().copied().collect();
    let mut pending: HashMap<usize, usize> = HashMap::with_capacity(batch.len());
    for &index in batch {
        let unsettled_deps = ctx
            .graph
            .dependencies_of(index)
            .iter()
            .filter(|&&dep| members.contains(&dep) && !ctx.ledger.is_recorded(dep))
            .count();
        pending.insert(index, unsettled_deps);
    }

    // Prerequisites settled outside this batch (earlier stages) may have
    // already doomed some members.
    for &index in batch {
        if ctx.ledger.is_recorded(index) {
            continue;
        }
        if let Some(dead) = dead_prerequisites(ctx, index) {
            let origin = dead
                .first()
                .and_then(|name| ctx.graph.index_of(name))
                .and_then(|dep| ctx.ledger.cancelled_origin(dep))
                .or_else(|| dead.first().cloned())
                .unwrap_or_else(|| ctx.name(index).to_string());
            record_dead(ctx, index, &origin);
            propagate_dead(ctx, &members, index);
        }
    }

    let mut ready: VecDeque<usize> = ctx
        .graph
        .topo_order()
        .iter()
        .copied()
        .filter(|i| members.contains(i) && pending[i] == 0 && !ctx.ledger.is_recorded(*i))
        .collect();
    let mut scheduled: HashSet<usize> = HashSet::new();
    let mut tasks: JoinSet<usize> = JoinSet::new();

    loop {
        if ctx.ledger.stopped() {
            for &index in batch {
                if !scheduled.contains(&index) && !ctx.ledger.is_recorded(index) {
                    ctx.ledger
                        .record_skip(index, skip_record(ctx, index, Some(CancellationReason::PolicyStop)));
                }
            }
            while tasks.join_next().await.is_some() {}
            return;
        }

        while let Some(index) = ready.pop_front() {
            if ctx.ledger.is_recorded(index) || !scheduled.insert(index) {
                continue;
            }
            let ctx_task = Arc::clone(ctx);
            tasks.spawn(async move {
                match admit(&ctx_task).await {
                    Admission::Admitted(permit) => {
                        let _permit = permit;
                        run_signal(&ctx_task, index).await;
                    }
                    Admission::Cancelled => {}
                }
                index
            });
        }

        let settled = match tasks.join_next().await {
            Some(Ok(index)) => index,
            // A panicked operation leaves its slot for finalization.
            Some(Err(_)) => continue,
            None => return,
        };

        match ctx.ledger.status_of(settled) {
            Some(SignalStatus::Succeeded) => {
                for &dependent in ctx.graph.dependents_of(settled) {
                    if !members.contains(&dependent) || ctx.ledger.is_recorded(dependent) {
                        continue;
                    }
                    if let Some(count) = pending.get_mut(&dependent) {
                        *count = count.saturating_sub(1);
                        if *count == 0 && !scheduled.contains(&dependent) {
                            ready.push_back(dependent);
                        }
                    }
                }
            }
            Some(_) => propagate_dead(ctx, &members, settled),
            None => {}
        }
    }
}

/// Direct prerequisites of `index` that settled in a non-success status.
fn dead_prerequisites(ctx: &ExecContext, index: usize) -> Option<Vec<String>> {
    let dead: Vec<String> = ctx
        .graph
        .dependencies_of(index)
        .iter()
        .filter(|&&dep| {
            matches!(
                ctx.ledger.status_of(dep),
                Some(
                    SignalStatus::Failed
                        | SignalStatus::TimedOut
                        | SignalStatus::Cancelled
                        | SignalStatus::Skipped
                )
            )
        })
        .map(|&dep| ctx.graph.name(dep).to_string())
        .collect();
    if dead.is_empty() { None } else { Some(dead) }
}

/// Records one never-started signal as dead: cancelled with the
/// originating failure, or skipped with its failed prerequisites, per
/// the options.
fn record_dead(ctx: &ExecContext, index: usize, origin: &str) {
    let at = ctx.now();
    let name = ctx.name(index);
    let record = if ctx.options.cancel_dependents_on_failure {
        SignalRecord::cancelled(name, at, at, CancellationReason::DependencyFailed)
            .with_cancelled_by(origin)
    } else {
        let failed = dead_prerequisites(ctx, index).unwrap_or_else(|| vec![origin.to_string()]);
        SignalRecord::skipped(name, at, None).with_failed_dependencies(failed)
    };
    ctx.ledger.record_skip(index, ctx.decorate(index, record));
}

/// Marks every unstarted transitive dependent of `from` as dead.
fn propagate_dead(ctx: &ExecContext, members: &HashSet<usize>, from: usize) {
    // Keep the origin stable across transitive hops: if `from` itself was
    // doomed by an earlier failure, point at that failure.
    let origin = ctx
        .ledger
        .cancelled_origin(from)
        .unwrap_or_else(|| ctx.graph.name(from).to_string());

    for dependent in ctx.graph.transitive_dependents(from) {
        if !members.contains(&dependent) || ctx.ledger.is_recorded(dependent) {
            continue;
        }
        record_dead(ctx, dependent, &origin);
    }
}

/// How a stage's supervised execution ended.
enum StageExit {
    /// Every stage signal settled before the next stage was due.
    Finished,
    /// The promotion threshold was met with signals still in flight.
    Promoted,
    /// A failure surfaced under the fail-fast stage policy.
    FailedEarly,
}

/// A promoted or abandoned stage whose stragglers are still running.
struct StragglingStage {
    number: u32,
    indices: Vec<usize>,
    handle: JoinHandle<()>,
}

/// Staged mode: iterates stages in order, each in its own mode, applying
/// the stage policy at every boundary. Nested `Staged` stages recurse.
pub(crate) async fn run_staged(ctx: &Arc<ExecContext>, plan: &StagePlan) {
    let mut stragglers: Vec<StragglingStage> = Vec::new();
    let mut skip_rest = false;
    run_stage_list(ctx, plan.stages(), &mut stragglers, &mut skip_rest).await;

    for stage in stragglers {
        let _ = stage.handle.await;
        let (_, settled) = ctx.ledger.tally(&stage.indices);
        let completed = settled == stage.indices.len();
        if let Some(meta) = ctx
            .stage_meta
            .lock()
            .expect("stage meta lock poisoned")
            .get_mut(&stage.number)
        {
            meta.completed = completed;
        }
    }
}

fn stage_indices(ctx: &ExecContext, stage: &Stage) -> Vec<usize> {
    stage
        .signals
        .iter()
        .filter_map(|name| ctx.graph.index_of(name))
        .collect()
}

fn run_stage_list<'a>(
    ctx: &'a Arc<ExecContext>,
    stages: &'a [Stage],
    stragglers: &'a mut Vec<StragglingStage>,
    skip_rest: &'a mut bool,
) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
    for stage in stages {
        if stage.mode == ExecutionMode::Staged {
            // Type-erased so the recursive future has a finite type.
            let children: std::pin::Pin<Box<dyn Future<Output = ()> + Send + '_>> =
                Box::pin(run_stage_list(ctx, &stage.children, stragglers, skip_rest));
            children.await;
            continue;
        }

        let indices = stage_indices(ctx, stage);
        let policy_stopped = ctx.ledger.stopped();
        if *skip_rest || policy_stopped || ctx.scope.is_cancelled() {
            let reason = policy_stopped.then_some(CancellationReason::PolicyStop);
            for &index in &indices {
                if !ctx.ledger.is_recorded(index) {
                    ctx.ledger.record_skip(index, skip_record(ctx, index, reason));
                }
            }
            ctx.record_stage_meta(
                stage.number,
                StageMeta {
                    name: stage.name.clone(),
                    promoted: false,
                    completed: false,
                },
            );
            continue;
        }

        tracing::debug!(stage = stage.number, name = %stage.name, "stage starting");
        let exit = supervise_stage(ctx, stage, &indices, stragglers).await;

        let (succeeded, settled) = ctx.ledger.tally(&indices);
        let all_succeeded = settled == indices.len() && succeeded == indices.len();
        let any_failed = indices
            .iter()
            .any(|&i| ctx.ledger.status_of(i) == Some(SignalStatus::Failed));

        match ctx.options.stage_policy {
            StagePolicyKind::AllMustSucceed => {
                if !all_succeeded {
                    *skip_rest = true;
                }
            }
            StagePolicyKind::FailFast => {
                if any_failed || matches!(exit, StageExit::FailedEarly) {
                    *skip_rest = true;
                }
            }
            StagePolicyKind::BestEffort | StagePolicyKind::EarlyPromotion => {}
        }
    }
    })
}

/// Runs one leaf stage under a derived stage scope, supervising it for
/// early promotion or early failure when the stage policy asks for it.
async fn supervise_stage(
    ctx: &Arc<ExecContext>,
    stage: &Stage,
    indices: &[usize],
    stragglers: &mut Vec<StragglingStage>,
) -> StageExit {
    let stage_ctx = Arc::new(ctx.with_scope(ctx.scope.child()));
    let mode = stage.mode;
    let batch = indices.to_vec();
    let mut handle = tokio::spawn(async move {
        match mode {
            ExecutionMode::Parallel => run_parallel(&stage_ctx, &batch).await,
            ExecutionMode::Sequential => run_sequential(&stage_ctx, &batch).await,
            ExecutionMode::DependencyAware => run_dependency_aware(&stage_ctx, &batch).await,
            // Validated away by the stage plan.
            ExecutionMode::Staged => {}
        }
    });

    let watch_for = ctx.options.stage_policy;
    let mut exit = StageExit::Finished;
    let mut finished = false;

    match watch_for {
        StagePolicyKind::EarlyPromotion | StagePolicyKind::FailFast => {
            let mut progress = ctx.ledger.progress();
            loop {
                let (succeeded, settled) = ctx.ledger.tally(indices);
                if watch_for == StagePolicyKind::EarlyPromotion
                    && !indices.is_empty()
                    && succeeded as f64 / indices.len() as f64
                        >= ctx.options.early_promotion_threshold
                {
                    if settled < indices.len() {
                        exit = StageExit::Promoted;
                    }
                    break;
                }
                if watch_for == StagePolicyKind::FailFast
                    && indices
                        .iter()
                        .any(|&i| ctx.ledger.status_of(i) == Some(SignalStatus::Failed))
                {
                    if settled < indices.len() {
                        exit = StageExit::FailedEarly;
                    }
                    break;
                }
                tokio::select! {
                    _ = &mut handle, if !finished => {
                        finished = true;
                        break;
                    }
                    changed = progress.changed() => {
                        if changed.is_err() && !finished {
                            let _ = (&mut handle).await;
                            finished = true;
                            break;
                        }
                    }
                }
            }
        }
        StagePolicyKind::AllMustSucceed | StagePolicyKind::BestEffort => {
            let _ = (&mut handle).await;
            finished = true;
        }
    }

    let leaves_work_behind = matches!(exit, StageExit::Promoted | StageExit::FailedEarly);
    if leaves_work_behind && !finished {
        ctx.record_stage_meta(
            stage.number,
            StageMeta {
                name: stage.name.clone(),
                promoted: matches!(exit, StageExit::Promoted),
                completed: false,
            },
        );
        stragglers.push(StragglingStage {
            number: stage.number,
            indices: indices.to_vec(),
            handle,
        });
    } else {
        if !finished {
            let _ = (&mut handle).await;
        }
        let (_, settled) = ctx.ledger.tally(indices);
        ctx.record_stage_meta(
            stage.number,
            StageMeta {
                name: stage.name.clone(),
                promoted: false,
                completed: settled == indices.len(),
            },
        );
    }
    exit
}

/// Entry point: dispatches the whole batch on the configured mode.
pub(crate) async fn execute(ctx: &Arc<ExecContext>, plan: Option<&StagePlan>) {
    let all: Vec<usize> = (0..ctx.signals.len()).collect();
    match ctx.options.execution_mode {
        ExecutionMode::Parallel => run_parallel(ctx, &all).await,
        ExecutionMode::Sequential => run_sequential(ctx, &all).await,
        ExecutionMode::DependencyAware => run_dependency_aware(ctx, &all).await,
        ExecutionMode::Staged => match plan {
            Some(plan) => run_staged(ctx, plan).await,
            // The registrar always supplies a plan for staged runs; an
            // absent plan degrades to a single parallel batch.
            None => run_parallel(ctx, &all).await,
        },
    }
}

/// Classifies every still-unsettled slot after the executor returns.
///
/// Signals stopped by a coordinator-issued cancellation take the scope's
/// cause (global timeout, external cancel); a started signal with no
/// cause on record can only mean its task aborted abnormally.
pub(crate) fn finalize_unsettled(ctx: &ExecContext) {
    let cause = ctx.scope.cause();
    for index in ctx.ledger.unsettled() {
        let now = ctx.now();
        let record = match (&cause, ctx.ledger.started_at(index)) {
            (Some(cause), started) => {
                let verdict = classify(RawOutcome::Cancelled, Some(cause.clone()), false);
                let started_at = started.unwrap_or(now);
                ctx.decorate(
                    index,
                    record_from_verdict(ctx.name(index), started_at, now, verdict),
                )
            }
            (None, Some(started_at)) => ctx.decorate(
                index,
                SignalRecord::failed(
                    ctx.name(index),
                    started_at,
                    now,
                    SignalError::other("operation terminated abnormally"),
                ),
            ),
            (None, None) => skip_record(ctx, index, None),
        };
        ctx.ledger.record_skip(index, record);
    }
}
