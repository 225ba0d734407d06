use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use ignition_types::SignalError;

use crate::scope::CancelScope;

/// A readiness operation: connect, warm, validate — whatever makes one
/// subsystem "ignited".
///
/// Implementations receive the signal's [`CancelScope`] and should observe
/// it at their own suspension points; the coordinator only ever signals
/// cancellation, it never reaches into the operation. An operation that
/// unwinds because the scope fired should return a
/// [`SignalError::cancelled`] payload so classification can tell the
/// unwind apart from a fault.
#[async_trait]
pub trait IgniteOperation: Send + Sync {
    async fn ignite(&self, scope: CancelScope) -> Result<(), SignalError>;
}

/// Adapter turning an async closure into an [`IgniteOperation`].
struct FnOperation<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> IgniteOperation for FnOperation<F>
where
    F: Fn(CancelScope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SignalError>> + Send,
{
    async fn ignite(&self, scope: CancelScope) -> Result<(), SignalError> {
        (self.f)(scope).await
    }
}

/// A named, cancellable readiness signal. Immutable after registration.
#[derive(Clone)]
pub struct Signal {
    name: String,
    deadline: Option<Duration>,
    operation: Arc<dyn IgniteOperation>,
}

impl Signal {
    /// Wraps a trait-object operation.
    pub fn new(name: impl Into<String>, operation: Arc<dyn IgniteOperation>) -> Self {
        Self {
            name: name.into(),
            deadline: None,
            operation,
        }
    }

    /// Wraps an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CancelScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SignalError>> + Send + 'static,
    {
        Self::new(name, Arc::new(FnOperation { f }))
    }

    /// Sets the per-signal deadline. The registrar rejects zero.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub(crate) fn operation(&self) -> Arc<dyn IgniteOperation> {
        Arc::clone(&self.operation)
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// One-shot memoized execution handle for a signal operation.
///
/// The operation starts on first access and its outcome is cached;
/// concurrent first-accessors share the single in-flight invocation, so
/// the operation runs at most once per coordinator instance.
pub(crate) struct MemoizedIgnition {
    operation: Arc<dyn IgniteOperation>,
    outcome: OnceCell<Result<(), SignalError>>,
    invocations: AtomicU32,
}

impl MemoizedIgnition {
    pub(crate) fn new(operation: Arc<dyn IgniteOperation>) -> Self {
        Self {
            operation,
            outcome: OnceCell::new(),
            invocations: AtomicU32::new(0),
        }
    }

    /// Runs the operation, or joins the in-flight/cached invocation.
    pub(crate) async fn ignite(&self, scope: CancelScope) -> Result<(), SignalError> {
        self.outcome
            .get_or_init(|| async {
                self.invocations.fetch_add(1, Ordering::SeqCst);
                self.operation.ignite(scope).await
            })
            .await
            .clone()
    }

    /// How many times the underlying operation actually started.
    pub(crate) fn invocation_count(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ignition_types::SignalErrorKind;

    #[tokio::test]
    async fn operation_runs_at_most_once() {
        let signal = Signal::from_fn("db", |_scope| async { Ok(()) });
        let memo = Arc::new(MemoizedIgnition::new(signal.operation()));

        let scope = CancelScope::root();
        memo.ignite(scope.child()).await.unwrap();
        memo.ignite(scope.child()).await.unwrap();

        assert_eq!(memo.invocation_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_accessors_share_one_invocation() {
        let signal = Signal::from_fn("db", |_scope| async {
            tokio::task::yield_now().await;
            Ok(())
        });
        let memo = Arc::new(MemoizedIgnition::new(signal.operation()));
        let scope = CancelScope::root();

        let a = tokio::spawn({
            let memo = Arc::clone(&memo);
            let scope = scope.child();
            async move { memo.ignite(scope).await }
        });
        let b = tokio::spawn({
            let memo = Arc::clone(&memo);
            let scope = scope.child();
            async move { memo.ignite(scope).await }
        });

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert_eq!(memo.invocation_count(), 1);
    }

    #[tokio::test]
    async fn cached_outcome_is_replayed_verbatim() {
        let signal = Signal::from_fn("db", |_scope| async {
            Err(SignalError::new(SignalErrorKind::Connection, "refused"))
        });
        let memo = MemoizedIgnition::new(signal.operation());
        let scope = CancelScope::root();

        let first = memo.ignite(scope.child()).await.unwrap_err();
        let second = memo.ignite(scope.child()).await.unwrap_err();

        assert_eq!(first, second);
        assert_eq!(memo.invocation_count(), 1);
    }

    #[test]
    fn deadline_is_carried_on_the_signal() {
        let signal = Signal::from_fn("db", |_scope| async { Ok(()) })
            .with_deadline(Duration::from_millis(250));
        assert_eq!(signal.deadline(), Some(Duration::from_millis(250)));
        assert_eq!(signal.name(), "db");
    }
}
