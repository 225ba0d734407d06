mod classify;
mod coordinator;
mod error;
mod executor;
mod graph;
mod ledger;
mod policy;
mod registrar;
mod scope;
mod signal;
mod stages;
mod strategy;

pub use coordinator::IgnitionCoordinator;
pub use error::IgnitionError;
pub use graph::DependencyGraph;
pub use policy::{BestEffort, ContinueOnTimeout, FailFast, IgnitionPolicy, PolicyContext};
pub use registrar::IgnitionRegistrar;
pub use scope::{CancelCause, CancelScope};
pub use signal::{IgniteOperation, Signal};
pub use stages::{Stage, StagePlan};
pub use strategy::{
    ClampTimeoutStrategy, DefaultTimeoutStrategy, NoTimeoutStrategy, TimeoutDecision,
    TimeoutStrategy,
};

/// The cancellation token accepted by `run_all`, re-exported so callers
/// do not need a direct tokio-util dependency.
pub use tokio_util::sync::CancellationToken;
