//! Input validation for prediction requests
//!
//! Hard rules reject a field (missing, non-numeric, non-finite, negative, or
//! above the plausibility ceiling). Values that pass but sit well outside the
//! canonical training range are accepted with a warning, because the model
//! still owes the caller a best-effort answer.

use crate::error::{FieldError, FieldIssue, ValidationError};
use crate::models::{FeatureVector, FEATURE_NAMES, NUM_FEATURES};
use crate::training::Dataset;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest plausible measurement in centimeters
pub const MAX_MEASUREMENT_CM: f64 = 10.0;

/// Documented maximum batch size
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Validator limits
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub max_measurement: f64,
    pub max_batch_size: usize,
    /// Fraction of each training range width added on both sides before a
    /// value is flagged
    pub range_margin: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_measurement: MAX_MEASUREMENT_CM,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            range_margin: 0.25,
        }
    }
}

/// Untyped request body for one sample. Any JSON value is accepted so that
/// type errors are reported per field instead of failing deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct RawFeatures {
    pub sepal_length: Option<Value>,
    pub sepal_width: Option<Value>,
    pub petal_length: Option<Value>,
    pub petal_width: Option<Value>,
    /// JSON type of a sample that was not an object
    #[serde(skip)]
    pub non_object: Option<&'static str>,
}

impl From<Value> for RawFeatures {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(mut map) => Self {
                sepal_length: map.remove("sepal_length"),
                sepal_width: map.remove("sepal_width"),
                petal_length: map.remove("petal_length"),
                petal_width: map.remove("petal_width"),
                non_object: None,
            },
            other => Self {
                non_object: Some(json_type(&other)),
                ..Self::default()
            },
        }
    }
}

impl RawFeatures {
    fn fields(&self) -> [Option<&Value>; NUM_FEATURES] {
        [
            self.sepal_length.as_ref(),
            self.sepal_width.as_ref(),
            self.petal_length.as_ref(),
            self.petal_width.as_ref(),
        ]
    }
}

/// Accepted value outside the widened training range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureWarning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub field: &'static str,
    pub value: f64,
    pub expected_min: f64,
    pub expected_max: f64,
}

#[derive(Debug, Clone)]
pub struct ValidatedFeatures {
    pub vector: FeatureVector,
    pub warnings: Vec<FeatureWarning>,
}

#[derive(Debug, Clone)]
pub struct ValidatedBatch {
    pub vectors: Vec<FeatureVector>,
    pub warnings: Vec<FeatureWarning>,
}

/// Validates and normalizes raw feature input
#[derive(Debug, Clone)]
pub struct FeatureValidator {
    config: ValidatorConfig,
    expected: [(f64, f64); NUM_FEATURES],
}

impl Default for FeatureValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl FeatureValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        let mut expected = Dataset::iris().feature_ranges();
        for (lo, hi) in expected.iter_mut() {
            let margin = (*hi - *lo) * config.range_margin;
            *lo = (*lo - margin).max(0.0);
            *hi += margin;
        }
        Self { config, expected }
    }

    pub fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    /// Validate one sample; every failing field is reported
    pub fn validate(&self, raw: &RawFeatures) -> Result<ValidatedFeatures, ValidationError> {
        self.validate_sample(None, raw)
            .map_err(ValidationError::Fields)
    }

    /// Validate a whole batch. Any failing element rejects the batch.
    pub fn validate_batch(&self, raw: &[RawFeatures]) -> Result<ValidatedBatch, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        if raw.len() > self.config.max_batch_size {
            return Err(ValidationError::BatchTooLarge {
                size: raw.len(),
                max: self.config.max_batch_size,
            });
        }

        let mut vectors = Vec::with_capacity(raw.len());
        let mut warnings = Vec::new();
        let mut failures = Vec::new();
        for (index, sample) in raw.iter().enumerate() {
            match self.validate_sample(Some(index), sample) {
                Ok(validated) => {
                    vectors.push(validated.vector);
                    warnings.extend(validated.warnings);
                }
                Err(errors) => failures.extend(errors),
            }
        }

        if !failures.is_empty() {
            return Err(ValidationError::BatchElements {
                total: raw.len(),
                failures,
            });
        }
        Ok(ValidatedBatch { vectors, warnings })
    }

    fn validate_sample(
        &self,
        index: Option<usize>,
        raw: &RawFeatures,
    ) -> Result<ValidatedFeatures, Vec<FieldError>> {
        if let Some(kind) = raw.non_object {
            return Err(vec![FieldError {
                index,
                field: "sample",
                issue: FieldIssue::NotAnObject,
                message: format!("must be an object, got {}", kind),
            }]);
        }
        self.validate_at(index, raw.fields().map(parse_field))
    }

    fn validate_at(
        &self,
        index: Option<usize>,
        parsed: [Result<f64, Issue>; NUM_FEATURES],
    ) -> Result<ValidatedFeatures, Vec<FieldError>> {
        let mut values = [0.0; NUM_FEATURES];
        let mut errors = Vec::new();
        for (j, value) in parsed.into_iter().enumerate() {
            match value.and_then(|v| self.check_value(v)) {
                Ok(v) => values[j] = v,
                Err((issue, message)) => errors.push(FieldError {
                    index,
                    field: FEATURE_NAMES[j],
                    issue,
                    message,
                }),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let warnings = values
            .iter()
            .zip(self.expected)
            .zip(FEATURE_NAMES)
            .filter(|((v, (lo, hi)), _)| **v < *lo || **v > *hi)
            .map(|((v, (lo, hi)), field)| FeatureWarning {
                index,
                field,
                value: *v,
                expected_min: lo,
                expected_max: hi,
            })
            .collect();

        Ok(ValidatedFeatures {
            vector: FeatureVector::from_array(values),
            warnings,
        })
    }

    fn check_value(&self, v: f64) -> Result<f64, Issue> {
        if !v.is_finite() {
            return Err((FieldIssue::NotFinite, "must be finite".to_string()));
        }
        if v < 0.0 {
            return Err((
                FieldIssue::Negative,
                format!("must be non-negative, got {}", v),
            ));
        }
        if v > self.config.max_measurement {
            return Err((
                FieldIssue::TooLarge,
                format!("must be at most {} cm, got {}", self.config.max_measurement, v),
            ));
        }
        Ok(round2(v))
    }
}

type Issue = (FieldIssue, String);

fn parse_field(value: Option<&Value>) -> Result<f64, Issue> {
    match value {
        None | Some(Value::Null) => Err((FieldIssue::Missing, "field required".to_string())),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or((FieldIssue::NotNumeric, "must be a number".to_string())),
        Some(other) => Err((
            FieldIssue::NotNumeric,
            format!("must be a number, got {}", json_type(other)),
        )),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
