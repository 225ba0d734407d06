mod recording;
mod replay;
mod summary;
mod whatif;

pub use recording::{
    Recording, RecordedConfiguration, RecordedSignal, RecordedStage, ReplayError,
};
pub use replay::{RecordingDiff, SignalDiff};
pub use summary::{RunSummary, compute_summary, peak_concurrency};
pub use whatif::WhatIf;
