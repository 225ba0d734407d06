use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

use ignition_types::CancellationReason;

/// Why a scope was cancelled.
///
/// Unlike [`CancellationReason`], this is the engine-internal cause and
/// carries the originating signal for dependency propagation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelCause {
    /// The run's global deadline fired with hard cancellation enabled.
    GlobalTimeout,
    /// A signal's own deadline fired with cancel-on-timeout enabled.
    PerSignalTimeout,
    /// A prerequisite ended badly; `origin` is the signal that failed.
    DependencyFailed { origin: String },
    /// A policy returned `false` and demanded cancellation.
    PolicyStop,
    /// The externally supplied token fired.
    External,
}

impl CancelCause {
    /// The record-level reason this cause maps to.
    pub fn reason(&self) -> CancellationReason {
        match self {
            Self::GlobalTimeout => CancellationReason::GlobalTimeout,
            Self::PerSignalTimeout => CancellationReason::PerSignalTimeout,
            Self::DependencyFailed { .. } => CancellationReason::DependencyFailed,
            Self::PolicyStop => CancellationReason::PolicyStop,
            Self::External => CancellationReason::ExternalCancel,
        }
    }

    /// The originating failed signal, for dependency propagation.
    pub fn origin(&self) -> Option<&str> {
        match self {
            Self::DependencyFailed { origin } => Some(origin),
            _ => None,
        }
    }
}

/// A node in the run's cancellation tree.
///
/// Cancelling a scope cancels every descendant; a child's cancellation
/// never reaches its parent or siblings. The cause travels with the
/// cancellation: a scope that observes its token cancelled resolves the
/// cause by checking its own cell first, then walking up the parent
/// chain, and finally falling back to [`CancelCause::External`] — a
/// cancelled token with no recorded cause can only mean the external
/// token supplied to `run_all` fired.
///
/// Scopes are explicit values passed through call frames; there is no
/// ambient state.
#[derive(Clone, Debug)]
pub struct CancelScope {
    token: CancellationToken,
    cause: Arc<OnceLock<CancelCause>>,
    parent: Option<Arc<CancelScope>>,
}

impl CancelScope {
    /// A fresh root scope with no external trigger.
    pub fn root() -> Self {
        Self {
            token: CancellationToken::new(),
            cause: Arc::new(OnceLock::new()),
            parent: None,
        }
    }

    /// A root scope that is cancelled when `external` fires.
    ///
    /// The scope's token is a child of the external token, so external
    /// cancellation propagates in but internal cancellation never
    /// escapes to the caller's token.
    pub fn with_external(external: CancellationToken) -> Self {
        Self {
            token: external.child_token(),
            cause: Arc::new(OnceLock::new()),
            parent: None,
        }
    }

    /// Derives a child scope. Cancelling `self` cancels the child;
    /// cancelling the child leaves `self` untouched.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            cause: Arc::new(OnceLock::new()),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Cancels this scope and every descendant, recording the cause.
    ///
    /// The first recorded cause wins; repeat cancellations are no-ops.
    pub fn cancel(&self, cause: CancelCause) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    /// Whether this scope (or an ancestor, or the external token) has
    /// been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves until this scope is cancelled. Resolves immediately when
    /// already cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The effective cancellation cause, walking the parent chain.
    ///
    /// Returns `None` while nothing is cancelled. Once the token is
    /// cancelled but no internal cause was recorded anywhere on the
    /// chain, the cause is [`CancelCause::External`].
    pub fn cause(&self) -> Option<CancelCause> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(cause) = scope.cause.get() {
                return Some(cause.clone());
            }
            current = scope.parent.as_deref();
        }
        if self.token.is_cancelled() {
            Some(CancelCause::External)
        } else {
            None
        }
    }
}
