//! Core data models for the serving path

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of input measurements per sample
pub const NUM_FEATURES: usize = 4;

/// Number of output classes
pub const NUM_CLASSES: usize = 3;

/// Input feature names in model column order
pub const FEATURE_NAMES: [&str; NUM_FEATURES] =
    ["sepal_length", "sepal_width", "petal_length", "petal_width"];

/// Output class labels in model column order
pub const CLASS_LABELS: [&str; NUM_CLASSES] = ["setosa", "versicolor", "virginica"];

/// Iris species predicted by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrisClass {
    Setosa,
    Versicolor,
    Virginica,
}

impl IrisClass {
    pub const ALL: [IrisClass; NUM_CLASSES] =
        [IrisClass::Setosa, IrisClass::Versicolor, IrisClass::Virginica];

    /// Map a model output column to its class
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        CLASS_LABELS[self.index()]
    }
}

impl fmt::Display for IrisClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IrisClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown iris class '{}'", s))
    }
}

/// Validated flower measurements in centimeters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

impl FeatureVector {
    pub fn new(sepal_length: f64, sepal_width: f64, petal_length: f64, petal_width: f64) -> Self {
        Self {
            sepal_length,
            sepal_width,
            petal_length,
            petal_width,
        }
    }

    pub fn from_array(values: [f64; NUM_FEATURES]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    /// Positional view in `FEATURE_NAMES` order
    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [
            self.sepal_length,
            self.sepal_width,
            self.petal_length,
            self.petal_width,
        ]
    }
}

/// Outcome of scoring one feature vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: IrisClass,
    pub confidence: f64,
    pub probabilities: BTreeMap<IrisClass, f64>,
    pub model_version: u64,
    pub processing_time_ms: f64,
}

/// Outcome of scoring a batch against a single artifact version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub predictions: Vec<PredictionResult>,
    pub model_version: u64,
    pub total_processing_time_ms: f64,
}

/// Metadata describing the installed model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_version: u64,
    pub model_type: String,
    pub classes: Vec<String>,
    pub features: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f64>,
}
