//! Model fitting and hold-out scoring

use crate::artifact::{argmax, softmax, CentroidModel, Classifier, LinearModel, StandardScaler};
use crate::models::{IrisClass, NUM_CLASSES, NUM_FEATURES};
use std::sync::atomic::{AtomicBool, Ordering};

/// Full-batch gradient descent settings for logistic regression
#[derive(Debug, Clone, Copy)]
pub struct GradientDescent {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
}

impl Default for GradientDescent {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            epochs: 500,
            l2: 1e-3,
        }
    }
}

type Sample = ([f64; NUM_FEATURES], IrisClass);

/// Fit multinomial logistic regression on already-transformed samples.
/// Returns `None` if `cancel` is set before the last epoch.
pub fn fit_logistic(samples: &[Sample], gd: GradientDescent, cancel: &AtomicBool) -> Option<LinearModel> {
    let n = samples.len().max(1) as f64;
    let mut weights = [[0.0; NUM_FEATURES]; NUM_CLASSES];
    let mut bias = [0.0; NUM_CLASSES];

    for _ in 0..gd.epochs {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        let mut grad_w = [[0.0; NUM_FEATURES]; NUM_CLASSES];
        let mut grad_b = [0.0; NUM_CLASSES];

        for (x, class) in samples {
            let mut logits = [0.0; NUM_CLASSES];
            for k in 0..NUM_CLASSES {
                logits[k] = bias[k] + (0..NUM_FEATURES).map(|j| weights[k][j] * x[j]).sum::<f64>();
            }
            let probs = softmax(&logits);
            for k in 0..NUM_CLASSES {
                let target = if k == class.index() { 1.0 } else { 0.0 };
                let delta = probs[k] - target;
                grad_b[k] += delta;
                for j in 0..NUM_FEATURES {
                    grad_w[k][j] += delta * x[j];
                }
            }
        }

        for k in 0..NUM_CLASSES {
            bias[k] -= gd.learning_rate * grad_b[k] / n;
            for j in 0..NUM_FEATURES {
                weights[k][j] -= gd.learning_rate * (grad_w[k][j] / n + gd.l2 * weights[k][j]);
            }
        }
    }

    Some(LinearModel {
        weights: weights.iter().map(|row| row.to_vec()).collect(),
        bias: bias.to_vec(),
    })
}

/// Per-class mean of already-transformed samples
pub fn fit_centroids(samples: &[Sample]) -> CentroidModel {
    let mut sums = [[0.0; NUM_FEATURES]; NUM_CLASSES];
    let mut counts = [0usize; NUM_CLASSES];
    for (x, class) in samples {
        counts[class.index()] += 1;
        for (s, v) in sums[class.index()].iter_mut().zip(x) {
            *s += v;
        }
    }
    CentroidModel {
        centroids: sums
            .iter()
            .zip(counts)
            .map(|(row, count)| row.iter().map(|s| s / count.max(1) as f64).collect())
            .collect(),
    }
}

/// Hold-out quality of one fitted candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub accuracy: f64,
    /// Support-weighted mean of per-class F1
    pub f1_score: f64,
}

pub fn evaluate(classifier: &Classifier, scaler: &StandardScaler, holdout: &[Sample]) -> Evaluation {
    let mut confusion = [[0usize; NUM_CLASSES]; NUM_CLASSES];
    for (x, class) in holdout {
        let predicted = scaler
            .transform(x)
            .ok()
            .and_then(|scaled| classifier.predict_proba(&scaled).ok())
            .map(|probs| argmax(&probs));
        // Unscorable samples count as misclassified
        match predicted {
            Some(p) => confusion[class.index()][p] += 1,
            None => confusion[class.index()][(class.index() + 1) % NUM_CLASSES] += 1,
        }
    }

    let total = holdout.len();
    if total == 0 {
        return Evaluation {
            accuracy: 0.0,
            f1_score: 0.0,
        };
    }

    let correct: usize = (0..NUM_CLASSES).map(|k| confusion[k][k]).sum();
    let mut weighted_f1 = 0.0;
    for k in 0..NUM_CLASSES {
        let tp = confusion[k][k] as f64;
        let support: usize = confusion[k].iter().sum();
        let predicted: usize = (0..NUM_CLASSES).map(|actual| confusion[actual][k]).sum();
        let precision = if predicted > 0 { tp / predicted as f64 } else { 0.0 };
        let recall = if support > 0 { tp / support as f64 } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        weighted_f1 += f1 * support as f64;
    }

    Evaluation {
        accuracy: correct as f64 / total as f64,
        f1_score: weighted_f1 / total as f64,
    }
}
