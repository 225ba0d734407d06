pub mod error;
pub mod options;
pub mod record;
pub mod result;
pub mod signal_error;
pub mod status;

pub use error::ConfigError;
pub use options::{ExecutionMode, IgnitionOptions, StagePolicyKind};
pub use record::SignalRecord;
pub use result::{RunResult, StageResult, StatusCounts};
pub use signal_error::{SignalError, SignalErrorKind};
pub use status::{CancellationReason, FinalState, SignalStatus, UnknownVariant};
