//! Error taxonomy for the serving and retraining paths

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// What was wrong with one input field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldIssue {
    Missing,
    NotNumeric,
    NotFinite,
    Negative,
    TooLarge,
    NotAnObject,
}

/// A single rejected field, optionally tagged with its batch index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub field: &'static str,
    pub issue: FieldIssue,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "samples[{}].{}: {}", index, self.field, self.message),
            None => write!(f, "{}: {}", self.field, self.message),
        }
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Bad, missing or out-of-range input. Always surfaced to the caller.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("invalid features: {}", join_fields(.0))]
    Fields(Vec<FieldError>),

    #[error("batch must contain at least one sample")]
    EmptyBatch,

    #[error("batch size {size} exceeds maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("{} of {total} samples failed validation: {}", count_samples(.failures), join_fields(.failures))]
    BatchElements {
        total: usize,
        failures: Vec<FieldError>,
    },

    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

fn count_samples(failures: &[FieldError]) -> usize {
    let mut indices: Vec<usize> = failures.iter().filter_map(|f| f.index).collect();
    indices.dedup();
    indices.len()
}

impl ValidationError {
    /// Per-field detail for error responses
    pub fn details(&self) -> &[FieldError] {
        match self {
            ValidationError::Fields(fields) => fields,
            ValidationError::BatchElements { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Model or transform failure on an otherwise valid input
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("feature transform expects {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("non-finite value produced by {stage}")]
    NonFinite { stage: &'static str },

    #[error("model selected unknown class index {0}")]
    UnknownClass(usize),
}

/// Retrain requested while another job is running
#[derive(Debug, Clone, Error)]
#[error("retraining job {running_job_id} is already running")]
pub struct ConflictError {
    pub running_job_id: u64,
}

/// Why a retraining job ended without installing a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    TrainerError,
    TrainerPanicked,
    InvalidArtifact,
}

impl FailureReason {
    pub const ALL: [FailureReason; 4] = [
        FailureReason::Timeout,
        FailureReason::TrainerError,
        FailureReason::TrainerPanicked,
        FailureReason::InvalidArtifact,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::TrainerError => "trainer_error",
            FailureReason::TrainerPanicked => "trainer_panicked",
            FailureReason::InvalidArtifact => "invalid_artifact",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Training collaborator error or rejected candidate. The previous artifact stays installed.
#[derive(Debug, Clone, Error)]
#[error("retraining failed ({reason}): {message}")]
pub struct RetrainFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl RetrainFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Audit sink failures. Logged, never propagated into a prediction response.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("audit record could not be encoded: {0}")]
    Encoding(String),

    #[error("audit store unavailable: {0}")]
    Unavailable(String),

    #[error("audit writer has shut down")]
    WriterClosed,
}

/// Artifact persistence and swap preconditions
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact version {offered} is not newer than installed version {installed}")]
    StaleVersion { installed: u64, offered: u64 },

    #[error("invalid artifact: {0}")]
    Invalid(String),

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Errors returned synchronously on the prediction path
#[derive(Debug, Error)]
pub enum ServingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(index: Option<usize>, field: &'static str) -> FieldError {
        FieldError {
            index,
            field,
            issue: FieldIssue::Negative,
            message: "must not be negative".to_string(),
        }
    }

    #[test]
    fn test_fields_error_message_lists_fields() {
        let err = ValidationError::Fields(vec![field(None, "sepal_length")]);
        assert_eq!(
            err.to_string(),
            "invalid features: sepal_length: must not be negative"
        );
    }

    #[test]
    fn test_batch_error_counts_distinct_samples() {
        let err = ValidationError::BatchElements {
            total: 5,
            failures: vec![
                field(Some(1), "sepal_length"),
                field(Some(1), "petal_width"),
                field(Some(3), "sepal_width"),
            ],
        };
        assert!(err.to_string().starts_with("2 of 5 samples failed validation"));
        assert_eq!(err.details().len(), 3);
    }

    #[test]
    fn test_failure_reason_labels() {
        let labels: Vec<&str> = FailureReason::ALL.iter().map(|r| r.as_str()).collect();
        assert_eq!(
            labels,
            ["timeout", "trainer_error", "trainer_panicked", "invalid_artifact"]
        );
    }
}
