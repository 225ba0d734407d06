use std::collections::HashMap;

use ignition_types::{ConfigError, ExecutionMode};

/// One stage of a staged run: a numbered, named group of signals executed
/// together under the stage's own mode.
///
/// A stage whose mode is [`ExecutionMode::Staged`] is a composite: its
/// signals live in `children` (which may nest further), and it carries no
/// direct signals of its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    pub number: u32,
    pub name: String,
    pub mode: ExecutionMode,
    pub signals: Vec<String>,
    pub children: Vec<Stage>,
}

impl Stage {
    pub fn new(number: u32, name: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            number,
            name: name.into(),
            mode,
            signals: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_signals<I, S>(mut self, signals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signals = signals.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_children(mut self, children: Vec<Stage>) -> Self {
        self.children = children;
        self
    }
}

/// The ordered stage list for a staged run.
///
/// Built by the application layer and validated by the registrar; signals
/// not named in any stage are assigned to stage 0 at build time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Validates structure and signal references.
    ///
    /// Rules: stage numbers strictly increase in plan (depth-first)
    /// order; composite stages carry children and no direct signals;
    /// leaf stages carry signals and no children; every referenced
    /// signal is known; no signal appears in two stages.
    pub fn validate(&self, known_signals: &[String]) -> Result<(), ConfigError> {
        let mut previous: Option<u32> = None;
        let mut assigned: HashMap<&str, u32> = HashMap::new();
        Self::validate_stages(&self.stages, known_signals, &mut previous, &mut assigned)
    }

    fn validate_stages<'a>(
        stages: &'a [Stage],
        known_signals: &[String],
        previous: &mut Option<u32>,
        assigned: &mut HashMap<&'a str, u32>,
    ) -> Result<(), ConfigError> {
        for stage in stages {
            if let Some(prev) = *previous {
                if stage.number <= prev {
                    return Err(ConfigError::StageNumberNotIncreasing {
                        number: stage.number,
                        previous: prev,
                    });
                }
            }
            *previous = Some(stage.number);

            match stage.mode {
                ExecutionMode::Staged => {
                    if !stage.signals.is_empty() {
                        return Err(ConfigError::StagedStageWithDirectSignals { number: stage.number });
                    }
                    if stage.children.is_empty() {
                        return Err(ConfigError::StagedStageWithoutChildren { number: stage.number });
                    }
                    Self::validate_stages(&stage.children, known_signals, previous, assigned)?;
                }
                _ => {
                    if !stage.children.is_empty() {
                        return Err(ConfigError::ChildStagesOutsideStagedMode {
                            number: stage.number,
                            mode: stage.mode,
                        });
                    }
                    if stage.signals.is_empty() {
                        return Err(ConfigError::EmptyStage { number: stage.number });
                    }
                    for name in &stage.signals {
                        if !known_signals.contains(name) {
                            return Err(ConfigError::UnknownStageSignal {
                                stage: stage.number,
                                name: name.clone(),
                            });
                        }
                        if assigned.insert(name.as_str(), stage.number).is_some() {
                            return Err(ConfigError::SignalInMultipleStages { name: name.clone() });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Maps every explicitly staged signal to its leaf stage number.
    pub fn assignment(&self) -> HashMap<String, u32> {
        let mut out = HashMap::new();
        Self::collect_assignment(&self.stages, &mut out);
        out
    }

    fn collect_assignment(stages: &[Stage], out: &mut HashMap<String, u32>) {
        for stage in stages {
            for name in &stage.signals {
                out.insert(name.clone(), stage.number);
            }
            Self::collect_assignment(&stage.children, out);
        }
    }

    /// Assigns unstaged signals to stage 0, creating or extending it.
    ///
    /// When a top-level non-composite stage 0 exists, the leftovers are
    /// appended to it; otherwise a parallel stage 0 is prepended.
    pub fn with_defaulted(mut self, unassigned: Vec<String>) -> Self {
        if unassigned.is_empty() {
            return self;
        }
        match self
            .stages
            .iter_mut()
            .find(|s| s.number == 0 && s.mode != ExecutionMode::Staged)
        {
            Some(stage_zero) => stage_zero.signals.extend(unassigned),
            None => self.stages.insert(
                0,
                Stage::new(0, "stage-0", ExecutionMode::Parallel).with_signals(unassigned),
            ),
        }
        self
    }
}
