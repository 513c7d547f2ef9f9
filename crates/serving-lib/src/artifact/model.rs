//! Feature transform and classifier parameters
//!
//! Both halves of an artifact are plain numeric parameter sets so they can be
//! persisted as JSON and checked structurally before installation.

use crate::error::InferenceError;
use crate::models::{NUM_CLASSES, NUM_FEATURES};
use serde::{Deserialize, Serialize};

/// Per-feature standardization: `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit mean and population standard deviation per column.
    /// Constant columns get a scale of 1 so they pass through centered.
    pub fn fit(samples: &[[f64; NUM_FEATURES]]) -> Self {
        let n = samples.len().max(1) as f64;
        let mut mean = vec![0.0; NUM_FEATURES];
        for row in samples {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut scale = vec![0.0; NUM_FEATURES];
        for row in samples {
            for (j, v) in row.iter().enumerate() {
                scale[j] += (v - mean[j]).powi(2);
            }
        }
        for s in scale.iter_mut() {
            *s = (*s / n).sqrt();
            if *s <= f64::EPSILON {
                *s = 1.0;
            }
        }

        Self { mean, scale }
    }

    pub fn transform(&self, x: &[f64]) -> Result<[f64; NUM_FEATURES], InferenceError> {
        if self.mean.len() != NUM_FEATURES || self.scale.len() != NUM_FEATURES {
            return Err(InferenceError::DimensionMismatch {
                expected: NUM_FEATURES,
                actual: self.mean.len().min(self.scale.len()),
            });
        }
        if x.len() != NUM_FEATURES {
            return Err(InferenceError::DimensionMismatch {
                expected: NUM_FEATURES,
                actual: x.len(),
            });
        }
        let mut out = [0.0; NUM_FEATURES];
        for j in 0..NUM_FEATURES {
            out[j] = (x[j] - self.mean[j]) / self.scale[j];
        }
        if out.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::NonFinite {
                stage: "feature transform",
            });
        }
        Ok(out)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.mean.len() != NUM_FEATURES || self.scale.len() != NUM_FEATURES {
            return Err(format!(
                "transform has {}/{} parameters, expected {}",
                self.mean.len(),
                self.scale.len(),
                NUM_FEATURES
            ));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err("transform mean contains non-finite values".to_string());
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("transform scale must be finite and positive".to_string());
        }
        Ok(())
    }
}

/// Multinomial logistic regression: one weight row and bias per class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

/// Nearest class centroid in transformed feature space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidModel {
    pub centroids: Vec<Vec<f64>>,
}

/// Fitted classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    LogisticRegression(LinearModel),
    NearestCentroid(CentroidModel),
}

impl Classifier {
    /// Human readable algorithm name reported by model info
    pub fn model_type(&self) -> &'static str {
        match self {
            Classifier::LogisticRegression(_) => "LogisticRegression",
            Classifier::NearestCentroid(_) => "NearestCentroid",
        }
    }

    /// Raw per-class scores; larger means more likely
    pub fn decision_function(&self, x: &[f64; NUM_FEATURES]) -> [f64; NUM_CLASSES] {
        let mut scores = [0.0; NUM_CLASSES];
        match self {
            Classifier::LogisticRegression(m) => {
                for ((score, w), b) in scores.iter_mut().zip(&m.weights).zip(&m.bias) {
                    *score = b + dot(w, x);
                }
            }
            Classifier::NearestCentroid(m) => {
                for (score, centroid) in scores.iter_mut().zip(&m.centroids) {
                    *score = -centroid
                        .iter()
                        .zip(x)
                        .map(|(c, v)| (v - c).powi(2))
                        .sum::<f64>();
                }
            }
        }
        scores
    }

    /// Scores normalized to a probability distribution
    pub fn predict_proba(
        &self,
        x: &[f64; NUM_FEATURES],
    ) -> Result<[f64; NUM_CLASSES], InferenceError> {
        let probs = softmax(&self.decision_function(x));
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(InferenceError::NonFinite { stage: "classifier" });
        }
        Ok(probs)
    }

    pub fn validate(&self) -> Result<(), String> {
        let rows: &[Vec<f64>] = match self {
            Classifier::LogisticRegression(m) => {
                if m.bias.len() != NUM_CLASSES {
                    return Err(format!(
                        "bias has {} entries, expected {}",
                        m.bias.len(),
                        NUM_CLASSES
                    ));
                }
                if m.bias.iter().any(|b| !b.is_finite()) {
                    return Err("bias contains non-finite values".to_string());
                }
                &m.weights
            }
            Classifier::NearestCentroid(m) => &m.centroids,
        };
        if rows.len() != NUM_CLASSES {
            return Err(format!(
                "classifier has {} class rows, expected {}",
                rows.len(),
                NUM_CLASSES
            ));
        }
        for row in rows {
            if row.len() != NUM_FEATURES {
                return Err(format!(
                    "classifier row has {} columns, expected {}",
                    row.len(),
                    NUM_FEATURES
                ));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err("classifier contains non-finite parameters".to_string());
            }
        }
        Ok(())
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Numerically stable softmax
pub fn softmax(scores: &[f64; NUM_CLASSES]) -> [f64; NUM_CLASSES] {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut out = [0.0; NUM_CLASSES];
    let mut sum = 0.0;
    for (o, s) in out.iter_mut().zip(scores) {
        *o = (s - max).exp();
        sum += *o;
    }
    out.iter_mut().for_each(|o| *o /= sum);
    out
}

/// Index of the largest value; the first wins ties
pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}
