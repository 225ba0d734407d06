use crate::options::ExecutionMode;

/// Configuration violations surfaced at registration and build time.
///
/// These are the only errors the registration surface produces; `run_all`
/// never reports configuration problems.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("signal name must not be empty")]
    EmptyName,

    #[error("duplicate signal name `{name}`")]
    DuplicateName { name: String },

    #[error("deadline for signal `{name}` must be positive")]
    NonPositiveDeadline { name: String },

    #[error("global deadline must be positive")]
    NonPositiveGlobalDeadline,

    #[error("max_concurrency must be positive")]
    NonPositiveConcurrency,

    #[error("early promotion threshold {value} is outside [0, 1]")]
    ThresholdOutOfRange { value: f64 },

    #[error("dependency cycle: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("signal `{signal}` depends on unknown signal `{dependency}`")]
    UnknownDependency { signal: String, dependency: String },

    #[error("signal `{name}` cannot depend on itself")]
    SelfDependency { name: String },

    #[error("stage {number} follows stage {previous}; numbers must be strictly increasing")]
    StageNumberNotIncreasing { number: u32, previous: u32 },

    #[error("stage {stage} references unknown signal `{name}`")]
    UnknownStageSignal { stage: u32, name: String },

    #[error("signal `{name}` is assigned to more than one stage")]
    SignalInMultipleStages { name: String },

    #[error("stage {number} has child stages but its mode is {mode}, not Staged")]
    ChildStagesOutsideStagedMode { number: u32, mode: ExecutionMode },

    #[error("stage {number} uses Staged mode but has no child stages")]
    StagedStageWithoutChildren { number: u32 },

    #[error("stage {number} uses Staged mode; its signals must live in child stages")]
    StagedStageWithDirectSignals { number: u32 },

    #[error("stage {number} has neither signals nor child stages")]
    EmptyStage { number: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_joins_the_path() {
        let err = ConfigError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
    }

    #[test]
    fn stage_mode_mismatch_names_the_mode() {
        let err = ConfigError::ChildStagesOutsideStagedMode {
            number: 2,
            mode: ExecutionMode::Parallel,
        };
        assert_eq!(
            err.to_string(),
            "stage 2 has child stages but its mode is Parallel, not Staged"
        );
    }
}
