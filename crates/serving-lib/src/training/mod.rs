//! Training collaborator
//!
//! Retraining re-runs the full candidate comparison on the canonical dataset:
//! a deterministic stratified split, a scaler fitted on the training half,
//! every classifier variant fitted behind it, and the best weighted F1 on the
//! hold-out half wins.

pub mod dataset;
pub mod fit;

pub use dataset::Dataset;
pub use fit::{Evaluation, GradientDescent};

use crate::artifact::{validate_parts, Classifier, StandardScaler};
use crate::models::{CLASS_LABELS, NUM_FEATURES};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Produces a new candidate artifact. Long running; never called on the request path.
#[async_trait]
pub trait Trainer: Send + Sync {
    async fn train(&self) -> Result<TrainedModel>;
}

/// A fitted candidate before the store stamps it with a version
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model_type: String,
    pub classes: Vec<String>,
    pub classifier: Classifier,
    pub transform: StandardScaler,
    /// Hold-out accuracy
    pub accuracy: f64,
    /// Hold-out weighted F1
    pub f1_score: f64,
    pub training_samples: usize,
}

impl TrainedModel {
    pub fn validate(&self) -> Result<(), String> {
        validate_parts(&self.classes, &self.classifier, &self.transform)
    }
}

/// Default trainer over the embedded iris dataset
#[derive(Debug, Clone)]
pub struct IrisTrainer {
    dataset: Dataset,
    holdout_every: usize,
    gradient_descent: GradientDescent,
}

impl Default for IrisTrainer {
    fn default() -> Self {
        Self::new()
    }
}

impl IrisTrainer {
    pub fn new() -> Self {
        Self::with_dataset(Dataset::iris())
    }

    pub fn with_dataset(dataset: Dataset) -> Self {
        Self {
            dataset,
            holdout_every: 5,
            gradient_descent: GradientDescent::default(),
        }
    }

    /// Fit every candidate and keep the best hold-out weighted F1.
    /// Ties keep the earlier candidate.
    pub fn fit_best(&self) -> Result<TrainedModel> {
        self.fit_best_until(&AtomicBool::new(false))
    }

    /// As `fit_best`, giving up with an error once `cancel` is set
    pub fn fit_best_until(&self, cancel: &AtomicBool) -> Result<TrainedModel> {
        let (train, holdout) = self.dataset.stratified_split(self.holdout_every);
        if train.is_empty() || holdout.is_empty() {
            bail!(
                "dataset of {} samples is too small to split",
                self.dataset.len()
            );
        }

        let raw: Vec<[f64; NUM_FEATURES]> = train.samples().iter().map(|(x, _)| *x).collect();
        let scaler = StandardScaler::fit(&raw);
        let scaled = train
            .samples()
            .iter()
            .map(|(x, class)| Ok((scaler.transform(x)?, *class)))
            .collect::<Result<Vec<_>, crate::error::InferenceError>>()
            .context("failed to transform training split")?;

        let Some(linear) = fit::fit_logistic(&scaled, self.gradient_descent, cancel) else {
            bail!("training cancelled");
        };
        let candidates = [
            Classifier::LogisticRegression(linear),
            Classifier::NearestCentroid(fit::fit_centroids(&scaled)),
        ];

        let mut best: Option<(Classifier, Evaluation)> = None;
        for candidate in candidates {
            let eval = fit::evaluate(&candidate, &scaler, holdout.samples());
            debug!(
                model_type = candidate.model_type(),
                accuracy = eval.accuracy,
                f1_score = eval.f1_score,
                "Candidate evaluated"
            );
            let better = best
                .as_ref()
                .map_or(true, |(_, current)| eval.f1_score > current.f1_score);
            if better {
                best = Some((candidate, eval));
            }
        }

        let Some((classifier, eval)) = best else {
            bail!("no candidate classifiers were fitted");
        };

        info!(
            model_type = classifier.model_type(),
            accuracy = eval.accuracy,
            f1_score = eval.f1_score,
            training_samples = train.len(),
            "Selected best candidate"
        );

        Ok(TrainedModel {
            model_type: classifier.model_type().to_string(),
            classes: CLASS_LABELS.iter().map(|c| c.to_string()).collect(),
            classifier,
            transform: scaler,
            accuracy: eval.accuracy,
            f1_score: eval.f1_score,
            training_samples: train.len(),
        })
    }
}

/// Raises the flag when dropped. Held by the future awaiting a blocking fit,
/// so abandoning that future stops the fit on the blocking pool.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl Trainer for IrisTrainer {
    async fn train(&self) -> Result<TrainedModel> {
        let trainer = self.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancel));
        tokio::task::spawn_blocking(move || trainer.fit_best_until(&cancel))
            .await
            .context("training task failed")?
    }
}
