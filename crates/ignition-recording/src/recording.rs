use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ignition_types::{
    FinalState, IgnitionOptions, RunResult, SignalError, SignalErrorKind, SignalRecord,
    StageResult, UnknownVariant,
};

use crate::summary::{RunSummary, compute_summary};

/// The serialized, language-neutral snapshot of one run.
///
/// The field names and shapes are the interchange contract: recordings
/// written here parse bit-compatibly elsewhere and vice versa. All
/// durations are non-negative milliseconds; `recorded_at` is the only
/// wall-clock value and exists for humans, not for classification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub recorded_at: DateTime<Utc>,
    pub total_duration_ms: u64,
    pub timed_out: bool,
    pub final_state: Option<String>,
    pub configuration: Option<RecordedConfiguration>,
    pub signals: Vec<RecordedSignal>,
    pub stages: Option<Vec<RecordedStage>>,
    pub summary: RunSummary,
    pub metadata: Option<BTreeMap<String, String>>,
}

/// The options the run executed under.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedConfiguration {
    pub execution_mode: String,
    pub policy: String,
    pub global_timeout_ms: u64,
    pub cancel_on_global_timeout: bool,
    pub cancel_individual_on_timeout: bool,
    pub max_degree_of_parallelism: Option<u64>,
    pub stage_policy: String,
    pub early_promotion_threshold: f64,
    pub cancel_dependents_on_failure: bool,
}

impl RecordedConfiguration {
    pub fn from_options(options: &IgnitionOptions, policy: &str) -> Self {
        Self {
            execution_mode: options.execution_mode.as_str().to_string(),
            policy: policy.to_string(),
            global_timeout_ms: options.global_deadline.as_millis() as u64,
            cancel_on_global_timeout: options.cancel_on_global_deadline,
            cancel_individual_on_timeout: options.cancel_individual_on_timeout,
            max_degree_of_parallelism: options.max_concurrency.map(|n| n as u64),
            stage_policy: options.stage_policy.as_str().to_string(),
            early_promotion_threshold: options.early_promotion_threshold,
            cancel_dependents_on_failure: options.cancel_dependents_on_failure,
        }
    }
}

/// One signal's recorded outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedSignal {
    pub signal_name: String,
    pub status: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
    pub stage: Option<u32>,
    pub dependencies: Option<Vec<String>>,
    pub failed_dependencies: Option<Vec<String>>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by_signal: Option<String>,
    pub exception_type: Option<String>,
    pub exception_message: Option<String>,
}

impl RecordedSignal {
    fn from_record(record: &SignalRecord) -> Self {
        Self {
            signal_name: record.name.clone(),
            status: record.status.as_str().to_string(),
            start_ms: record.started_at.as_millis() as u64,
            end_ms: record.completed_at.as_millis() as u64,
            duration_ms: record.duration.as_millis() as u64,
            stage: record.stage,
            dependencies: record.dependencies.clone(),
            failed_dependencies: record.failed_dependencies.clone(),
            cancellation_reason: record.cancellation_reason.map(|r| r.as_str().to_string()),
            cancelled_by_signal: record.cancelled_by.clone(),
            exception_type: record.failure.as_ref().map(|f| f.kind.as_str().to_string()),
            exception_message: record.failure.as_ref().map(|f| f.message.clone()),
        }
    }

    fn to_record(&self) -> Result<SignalRecord, ReplayError> {
        let mut record = SignalRecord {
            name: self.signal_name.clone(),
            status: self.status.parse()?,
            started_at: Duration::from_millis(self.start_ms),
            completed_at: Duration::from_millis(self.end_ms),
            duration: Duration::from_millis(self.duration_ms),
            failure: None,
            failed_dependencies: self.failed_dependencies.clone(),
            cancellation_reason: match &self.cancellation_reason {
                Some(reason) => Some(reason.parse()?),
                None => None,
            },
            cancelled_by: self.cancelled_by_signal.clone(),
            stage: self.stage,
            dependencies: self.dependencies.clone(),
        };
        if let Some(message) = &self.exception_message {
            record.failure = Some(SignalError::new(
                parse_error_kind(self.exception_type.as_deref()),
                message.clone(),
            ));
        }
        Ok(record)
    }
}

/// One stage's recorded outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedStage {
    pub stage_number: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
    pub signal_count: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub timed_out_count: usize,
    pub early_promoted: bool,
}

impl RecordedStage {
    fn from_stage(stage: &StageResult) -> Self {
        Self {
            stage_number: stage.number,
            start_ms: stage.started_at.as_millis() as u64,
            end_ms: stage.completed_at.as_millis() as u64,
            duration_ms: stage.duration.as_millis() as u64,
            signal_count: stage.records.len(),
            succeeded_count: stage.counts.succeeded,
            failed_count: stage.counts.failed,
            timed_out_count: stage.counts.timed_out,
            early_promoted: stage.promoted,
        }
    }
}

/// Errors when parsing a recording back into result values.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("malformed recording: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Variant(#[from] UnknownVariant),
}

fn parse_error_kind(kind: Option<&str>) -> SignalErrorKind {
    match kind {
        Some("Connection") => SignalErrorKind::Connection,
        Some("Io") => SignalErrorKind::Io,
        Some("Validation") => SignalErrorKind::Validation,
        Some("Unavailable") => SignalErrorKind::Unavailable,
        Some("Cancelled") => SignalErrorKind::Cancelled,
        _ => SignalErrorKind::Other,
    }
}

impl Recording {
    /// Captures a finished run. `recorded_at` is stamped now; use
    /// [`Self::with_recorded_at`] to pin it (tests, replays).
    pub fn from_result(result: &RunResult) -> Self {
        let signals: Vec<RecordedSignal> =
            result.signal_records.iter().map(RecordedSignal::from_record).collect();
        let summary = compute_summary(&signals);
        Self {
            recorded_at: Utc::now(),
            total_duration_ms: result.total_duration.as_millis() as u64,
            timed_out: result.timed_out,
            final_state: Some(result.final_state.as_str().to_string()),
            configuration: None,
            signals,
            stages: result
                .stage_results
                .as_ref()
                .map(|stages| stages.iter().map(RecordedStage::from_stage).collect()),
            summary,
            metadata: None,
        }
    }

    pub fn with_configuration(mut self, configuration: RecordedConfiguration) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.recorded_at = at;
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Maps the recording back into a [`RunResult`].
    ///
    /// Everything the interchange format carries is preserved; fields it
    /// does not carry (stage names, the stage `completed` flag) are
    /// reconstructed with neutral values.
    pub fn reconstruct(&self) -> Result<RunResult, ReplayError> {
        let signal_records: Vec<SignalRecord> = self
            .signals
            .iter()
            .map(RecordedSignal::to_record)
            .collect::<Result<_, _>>()?;

        let stage_results = match &self.stages {
            None => None,
            Some(stages) => {
                let mut out = Vec::with_capacity(stages.len());
                for stage in stages {
                    let records: Vec<SignalRecord> = signal_records
                        .iter()
                        .filter(|r| r.stage == Some(stage.stage_number))
                        .cloned()
                        .collect();
                    let mut rebuilt = StageResult::from_records(
                        stage.stage_number,
                        format!("stage-{}", stage.stage_number),
                        records,
                        true,
                        stage.early_promoted,
                    );
                    // The recorded window is authoritative over the
                    // derived one (ms truncation).
                    rebuilt.started_at = Duration::from_millis(stage.start_ms);
                    rebuilt.completed_at = Duration::from_millis(stage.end_ms);
                    rebuilt.duration = Duration::from_millis(stage.duration_ms);
                    out.push(rebuilt);
                }
                Some(out)
            }
        };

        let final_state = match &self.final_state {
            Some(state) => state.parse()?,
            None => FinalState::NotStarted,
        };

        Ok(RunResult {
            signal_records,
            stage_results,
            total_duration: Duration::from_millis(self.total_duration_ms),
            timed_out: self.timed_out,
            final_state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ignition_types::{CancellationReason, SignalStatus};

    fn sample_result() -> RunResult {
        let records = vec![
            SignalRecord::succeeded("db", Duration::from_millis(2), Duration::from_millis(150))
                .with_stage(0),
            SignalRecord::failed(
                "broker",
                Duration::from_millis(3),
                Duration::from_millis(90),
                SignalError::new(SignalErrorKind::Connection, "refused"),
            )
            .with_stage(0),
            SignalRecord::cancelled(
                "search",
                Duration::from_millis(95),
                Duration::from_millis(95),
                CancellationReason::DependencyFailed,
            )
            .with_cancelled_by("broker")
            .with_dependencies(vec!["broker".into()])
            .with_stage(1),
        ];
        let stages = vec![
            StageResult::from_records(0, "infra", records[..2].to_vec(), true, false),
            StageResult::from_records(1, "services", records[2..].to_vec(), true, false),
        ];
        RunResult {
            signal_records: records,
            stage_results: Some(stages),
            total_duration: Duration::from_millis(152),
            timed_out: false,
            final_state: FinalState::Failed,
        }
    }

    fn pinned(result: &RunResult) -> Recording {
        Recording::from_result(result)
            .with_recorded_at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let recording = pinned(&sample_result()).with_configuration(RecordedConfiguration {
            execution_mode: "Staged".into(),
            policy: "best_effort".into(),
            global_timeout_ms: 30_000,
            cancel_on_global_timeout: false,
            cancel_individual_on_timeout: true,
            max_degree_of_parallelism: Some(4),
            stage_policy: "AllMustSucceed".into(),
            early_promotion_threshold: 1.0,
            cancel_dependents_on_failure: true,
        });

        let json = recording.to_json().unwrap();
        let parsed = Recording::from_json(&json).unwrap();
        similar_asserts::assert_eq!(recording, parsed);
    }

    #[test]
    fn reconstruct_preserves_interchange_fields() {
        let result = sample_result();
        let rebuilt = pinned(&result).reconstruct().unwrap();

        assert_eq!(rebuilt.total_duration, result.total_duration);
        assert_eq!(rebuilt.timed_out, result.timed_out);
        assert_eq!(rebuilt.final_state, result.final_state);
        assert_eq!(rebuilt.signal_records.len(), result.signal_records.len());
        for (a, b) in rebuilt.signal_records.iter().zip(&result.signal_records) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.status, b.status);
            assert_eq!(a.started_at, b.started_at);
            assert_eq!(a.completed_at, b.completed_at);
            assert_eq!(a.cancellation_reason, b.cancellation_reason);
            assert_eq!(a.cancelled_by, b.cancelled_by);
            assert_eq!(a.stage, b.stage);
            assert_eq!(a.dependencies, b.dependencies);
            assert_eq!(a.failed_dependencies, b.failed_dependencies);
        }
        let stages = rebuilt.stage_results.unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].counts.failed, 1);
    }

    #[test]
    fn failure_cause_survives_as_exception_fields() {
        let recording = pinned(&sample_result());
        let broker = &recording.signals[1];
        assert_eq!(broker.exception_type.as_deref(), Some("Connection"));
        assert_eq!(broker.exception_message.as_deref(), Some("refused"));

        let rebuilt = recording.reconstruct().unwrap();
        let failure = rebuilt.signal_records[1].failure.as_ref().unwrap();
        assert_eq!(failure.kind, SignalErrorKind::Connection);
        assert_eq!(failure.message, "refused");
    }

    #[test]
    fn unknown_status_string_fails_to_parse() {
        let mut recording = pinned(&sample_result());
        recording.signals[0].status = "Exploded".into();
        assert!(matches!(
            recording.reconstruct(),
            Err(ReplayError::Variant(_))
        ));
    }

    #[test]
    fn statuses_map_onto_interchange_strings() {
        let recording = pinned(&sample_result());
        let statuses: Vec<&str> = recording.signals.iter().map(|s| s.status.as_str()).collect();
        assert_eq!(statuses, vec!["Succeeded", "Failed", "Cancelled"]);
        assert_eq!(
            recording.signals[2].cancellation_reason.as_deref(),
            Some("DependencyFailed")
        );
        let rebuilt = recording.reconstruct().unwrap();
        assert_eq!(rebuilt.signal_records[2].status, SignalStatus::Cancelled);
    }

    #[test]
    fn interchange_shape_uses_the_contract_field_names() {
        let recording = pinned(&sample_result()).with_metadata(BTreeMap::from([(
            "service".to_string(),
            "checkout".to_string(),
        )]));
        let value: serde_json::Value = serde_json::from_str(&recording.to_json().unwrap()).unwrap();

        assert_eq!(value["recorded_at"], "2024-05-01T12:00:00Z");
        assert_eq!(value["total_duration_ms"], 152);
        assert_eq!(value["final_state"], "Failed");
        assert_eq!(value["metadata"]["service"], "checkout");

        let signal = &value["signals"][1];
        for key in [
            "signal_name",
            "status",
            "start_ms",
            "end_ms",
            "duration_ms",
            "stage",
            "dependencies",
            "failed_dependencies",
            "cancellation_reason",
            "cancelled_by_signal",
            "exception_type",
            "exception_message",
        ] {
            assert!(signal.get(key).is_some(), "missing signal field {key}");
        }

        let stage = &value["stages"][0];
        for key in [
            "stage_number",
            "start_ms",
            "end_ms",
            "duration_ms",
            "signal_count",
            "succeeded_count",
            "failed_count",
            "timed_out_count",
            "early_promoted",
        ] {
            assert!(stage.get(key).is_some(), "missing stage field {key}");
        }

        let summary = &value["summary"];
        for key in [
            "total_signals",
            "succeeded_count",
            "failed_count",
            "timed_out_count",
            "skipped_count",
            "cancelled_count",
            "max_concurrency",
            "slowest_signal_name",
            "slowest_duration_ms",
            "fastest_signal_name",
            "fastest_duration_ms",
            "average_duration_ms",
        ] {
            assert!(summary.get(key).is_some(), "missing summary field {key}");
        }
    }
}
