//! Prediction engine
//!
//! Scores validated feature vectors against the artifact that is current at
//! call time. A batch fetches the artifact once, so every element of one batch
//! is scored by the same model version even if a swap lands mid-batch.

use crate::artifact::{ArtifactStore, ModelArtifact};
use crate::error::InferenceError;
use crate::models::{BatchPrediction, FeatureVector, IrisClass, PredictionResult};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Maximum inference latency before warning
const MAX_INFERENCE_MS: f64 = 5.0;

/// Inference statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub total_inferences: u64,
    pub slow_inferences: u64,
}

/// Applies the bundled transform and classifier of the current artifact
#[derive(Debug)]
pub struct PredictionEngine {
    store: Arc<ArtifactStore>,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl PredictionEngine {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self {
            store,
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<PredictionResult, InferenceError> {
        let artifact = self.store.current();
        let start = Instant::now();
        let mut result = score(&artifact, features)?;
        result.processing_time_ms = elapsed_ms(start);
        self.observe(result.processing_time_ms, 1);
        Ok(result)
    }

    /// Order-preserving: one result per input, same order.
    /// The first failing element fails the whole call.
    pub fn predict_batch(
        &self,
        batch: &[FeatureVector],
    ) -> Result<BatchPrediction, InferenceError> {
        let artifact = self.store.current();
        let start = Instant::now();

        let mut predictions = Vec::with_capacity(batch.len());
        for features in batch {
            let item_start = Instant::now();
            let mut result = score(&artifact, features)?;
            result.processing_time_ms = elapsed_ms(item_start);
            predictions.push(result);
        }

        let total_processing_time_ms = elapsed_ms(start);
        self.observe(total_processing_time_ms, batch.len());
        Ok(BatchPrediction {
            predictions,
            model_version: artifact.version,
            total_processing_time_ms,
        })
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            slow_inferences: self.slow_inference_count.load(Ordering::Relaxed),
        }
    }

    fn observe(&self, elapsed_ms: f64, samples: usize) {
        self.inference_count
            .fetch_add(samples as u64, Ordering::Relaxed);
        if elapsed_ms > MAX_INFERENCE_MS {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(
                elapsed_ms,
                samples, "Inference exceeded {}ms target", MAX_INFERENCE_MS
            );
        } else {
            debug!(elapsed_ms, samples, "Inference completed");
        }
    }
}

fn score(
    artifact: &ModelArtifact,
    features: &FeatureVector,
) -> Result<PredictionResult, InferenceError> {
    let (prediction, probs) = artifact.score(features)?;
    Ok(PredictionResult {
        prediction,
        confidence: probs[prediction.index()].clamp(0.0, 1.0),
        probabilities: IrisClass::ALL.iter().map(|c| (*c, probs[c.index()])).collect(),
        model_version: artifact.version,
        processing_time_ms: 0.0,
    })
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
