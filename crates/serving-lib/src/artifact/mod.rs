//! Versioned model artifacts
//!
//! An artifact pairs a fitted classifier with the feature transform it was
//! trained behind. Artifacts are immutable once built; the store replaces
//! them whole.

mod model;
mod repository;
mod store;

pub use model::{argmax, softmax, CentroidModel, Classifier, LinearModel, StandardScaler};
pub use repository::{ArtifactRepository, DEFAULT_VERSIONS_TO_KEEP};
pub use store::ArtifactStore;

use crate::error::InferenceError;
use crate::models::{FeatureVector, IrisClass, ModelInfo, CLASS_LABELS, FEATURE_NAMES, NUM_CLASSES};
use crate::training::TrainedModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The installed (classifier, transform) unit with its version metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u64,
    pub model_type: String,
    pub classes: Vec<String>,
    pub classifier: Classifier,
    pub transform: StandardScaler,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub f1_score: Option<f64>,
}

impl ModelArtifact {
    /// Stamp a trained candidate with its installed version
    pub fn from_candidate(candidate: TrainedModel, version: u64) -> Self {
        Self {
            version,
            model_type: candidate.model_type,
            classes: candidate.classes,
            classifier: candidate.classifier,
            transform: candidate.transform,
            created_at: Utc::now(),
            accuracy: Some(candidate.accuracy),
            f1_score: Some(candidate.f1_score),
        }
    }

    /// Structural checks that make scoring infallible for well-formed input
    pub fn validate(&self) -> Result<(), String> {
        validate_parts(&self.classes, &self.classifier, &self.transform)
    }

    /// Transform then classify one sample
    pub fn score(
        &self,
        features: &FeatureVector,
    ) -> Result<(IrisClass, [f64; NUM_CLASSES]), InferenceError> {
        let x = self.transform.transform(&features.to_array())?;
        let probabilities = self.classifier.predict_proba(&x)?;
        let best = argmax(&probabilities);
        let class = IrisClass::from_index(best).ok_or(InferenceError::UnknownClass(best))?;
        Ok((class, probabilities))
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            model_version: self.version,
            model_type: self.model_type.clone(),
            classes: self.classes.clone(),
            features: FEATURE_NAMES.iter().map(|f| f.to_string()).collect(),
            created_at: self.created_at,
            accuracy: self.accuracy,
            f1_score: self.f1_score,
        }
    }
}

/// Shared validation for installed artifacts and retraining candidates
pub fn validate_parts(
    classes: &[String],
    classifier: &Classifier,
    transform: &StandardScaler,
) -> Result<(), String> {
    if classes.len() != CLASS_LABELS.len()
        || classes.iter().zip(CLASS_LABELS).any(|(c, expected)| c != expected)
    {
        return Err(format!(
            "class labels {:?} do not match expected {:?}",
            classes, CLASS_LABELS
        ));
    }
    classifier.validate()?;
    transform.validate()?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A hand-built artifact whose centroids sit on the three species means
    pub fn centroid_artifact(version: u64) -> ModelArtifact {
        ModelArtifact {
            version,
            model_type: "NearestCentroid".to_string(),
            classes: CLASS_LABELS.iter().map(|c| c.to_string()).collect(),
            classifier: Classifier::NearestCentroid(CentroidModel {
                centroids: vec![
                    vec![5.006, 3.428, 1.462, 0.246],
                    vec![5.936, 2.770, 4.260, 1.326],
                    vec![6.588, 2.974, 5.552, 2.026],
                ],
            }),
            transform: StandardScaler {
                mean: vec![0.0; 4],
                scale: vec![1.0; 4],
            },
            created_at: Utc::now(),
            accuracy: None,
            f1_score: None,
        }
    }

    /// The same parameters as an unversioned training result
    pub fn centroid_candidate() -> TrainedModel {
        let artifact = centroid_artifact(0);
        TrainedModel {
            model_type: artifact.model_type,
            classes: artifact.classes,
            classifier: artifact.classifier,
            transform: artifact.transform,
            accuracy: 0.95,
            f1_score: 0.95,
            training_samples: 120,
        }
    }
}
