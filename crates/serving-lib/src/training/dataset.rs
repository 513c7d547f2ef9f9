//! Canonical iris measurements used for bootstrap and retraining

use crate::models::{FeatureVector, IrisClass, NUM_FEATURES};

/// Labelled training samples
#[derive(Debug, Clone)]
pub struct Dataset {
    samples: Vec<([f64; NUM_FEATURES], IrisClass)>,
}

impl Dataset {
    pub fn new(samples: Vec<([f64; NUM_FEATURES], IrisClass)>) -> Self {
        Self { samples }
    }

    /// Fisher's 150-sample iris dataset, 50 per species
    pub fn iris() -> Self {
        Self::new(IRIS.to_vec())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[([f64; NUM_FEATURES], IrisClass)] {
        &self.samples
    }

    /// Deterministic stratified split: every `holdout_every`-th sample of each
    /// class goes to the hold-out set.
    pub fn stratified_split(&self, holdout_every: usize) -> (Dataset, Dataset) {
        let holdout_every = holdout_every.max(2);
        let mut seen = [0usize; 3];
        let mut train = Vec::new();
        let mut holdout = Vec::new();
        for &(x, class) in &self.samples {
            let n = &mut seen[class.index()];
            if *n % holdout_every == 0 {
                holdout.push((x, class));
            } else {
                train.push((x, class));
            }
            *n += 1;
        }
        (Dataset::new(train), Dataset::new(holdout))
    }

    /// Observed (min, max) per feature
    pub fn feature_ranges(&self) -> [(f64, f64); NUM_FEATURES] {
        let mut ranges = [(f64::INFINITY, f64::NEG_INFINITY); NUM_FEATURES];
        for (x, _) in &self.samples {
            for (range, v) in ranges.iter_mut().zip(x) {
                range.0 = range.0.min(*v);
                range.1 = range.1.max(*v);
            }
        }
        ranges
    }

    pub fn features(&self) -> impl Iterator<Item = FeatureVector> + '_ {
        self.samples.iter().map(|(x, _)| FeatureVector::from_array(*x))
    }
}

#[rustfmt::skip]
const IRIS: [([f64; NUM_FEATURES], IrisClass); 150] = [
    ([5.1, 3.5, 1.4, 0.2], IrisClass::Setosa),
    ([4.9, 3.0, 1.4, 0.2], IrisClass::Setosa),
    ([4.7, 3.2, 1.3, 0.2], IrisClass::Setosa),
    ([4.6, 3.1, 1.5, 0.2], IrisClass::Setosa),
    ([5.0, 3.6, 1.4, 0.2], IrisClass::Setosa),
    ([5.4, 3.9, 1.7, 0.4], IrisClass::Setosa),
    ([4.6, 3.4, 1.4, 0.3], IrisClass::Setosa),
    ([5.0, 3.4, 1.5, 0.2], IrisClass::Setosa),
    ([4.4, 2.9, 1.4, 0.2], IrisClass::Setosa),
    ([4.9, 3.1, 1.5, 0.1], IrisClass::Setosa),
    ([5.4, 3.7, 1.5, 0.2], IrisClass::Setosa),
    ([4.8, 3.4, 1.6, 0.2], IrisClass::Setosa),
    ([4.8, 3.0, 1.4, 0.1], IrisClass::Setosa),
    ([4.3, 3.0, 1.1, 0.1], IrisClass::Setosa),
    ([5.8, 4.0, 1.2, 0.2], IrisClass::Setosa),
    ([5.7, 4.4, 1.5, 0.4], IrisClass::Setosa),
    ([5.4, 3.9, 1.3, 0.4], IrisClass::Setosa),
    ([5.1, 3.5, 1.4, 0.3], IrisClass::Setosa),
    ([5.7, 3.8, 1.7, 0.3], IrisClass::Setosa),
    ([5.1, 3.8, 1.5, 0.3], IrisClass::Setosa),
    ([5.4, 3.4, 1.7, 0.2], IrisClass::Setosa),
    ([5.1, 3.7, 1.5, 0.4], IrisClass::Setosa),
    ([4.6, 3.6, 1.0, 0.2], IrisClass::Setosa),
    ([5.1, 3.3, 1.7, 0.5], IrisClass::Setosa),
    ([4.8, 3.4, 1.9, 0.2], IrisClass::Setosa),
    ([5.0, 3.0, 1.6, 0.2], IrisClass::Setosa),
    ([5.0, 3.4, 1.6, 0.4], IrisClass::Setosa),
    ([5.2, 3.5, 1.5, 0.2], IrisClass::Setosa),
    ([5.2, 3.4, 1.4, 0.2], IrisClass::Setosa),
    ([4.7, 3.2, 1.6, 0.2], IrisClass::Setosa),
    ([4.8, 3.1, 1.6, 0.2], IrisClass::Setosa),
    ([5.4, 3.4, 1.5, 0.4], IrisClass::Setosa),
    ([5.2, 4.1, 1.5, 0.1], IrisClass::Setosa),
    ([5.5, 4.2, 1.4, 0.2], IrisClass::Setosa),
    ([4.9, 3.1, 1.5, 0.2], IrisClass::Setosa),
    ([5.0, 3.2, 1.2, 0.2], IrisClass::Setosa),
    ([5.5, 3.5, 1.3, 0.2], IrisClass::Setosa),
    ([4.9, 3.6, 1.4, 0.1], IrisClass::Setosa),
    ([4.4, 3.0, 1.3, 0.2], IrisClass::Setosa),
    ([5.1, 3.4, 1.5, 0.2], IrisClass::Setosa),
    ([5.0, 3.5, 1.3, 0.3], IrisClass::Setosa),
    ([4.5, 2.3, 1.3, 0.3], IrisClass::Setosa),
    ([4.4, 3.2, 1.3, 0.2], IrisClass::Setosa),
    ([5.0, 3.5, 1.6, 0.6], IrisClass::Setosa),
    ([5.1, 3.8, 1.9, 0.4], IrisClass::Setosa),
    ([4.8, 3.0, 1.4, 0.3], IrisClass::Setosa),
    ([5.1, 3.8, 1.6, 0.2], IrisClass::Setosa),
    ([4.6, 3.2, 1.4, 0.2], IrisClass::Setosa),
    ([5.3, 3.7, 1.5, 0.2], IrisClass::Setosa),
    ([5.0, 3.3, 1.4, 0.2], IrisClass::Setosa),
    ([7.0, 3.2, 4.7, 1.4], IrisClass::Versicolor),
    ([6.4, 3.2, 4.5, 1.5], IrisClass::Versicolor),
    ([6.9, 3.1, 4.9, 1.5], IrisClass::Versicolor),
    ([5.5, 2.3, 4.0, 1.3], IrisClass::Versicolor),
    ([6.5, 2.8, 4.6, 1.5], IrisClass::Versicolor),
    ([5.7, 2.8, 4.5, 1.3], IrisClass::Versicolor),
    ([6.3, 3.3, 4.7, 1.6], IrisClass::Versicolor),
    ([4.9, 2.4, 3.3, 1.0], IrisClass::Versicolor),
    ([6.6, 2.9, 4.6, 1.3], IrisClass::Versicolor),
    ([5.2, 2.7, 3.9, 1.4], IrisClass::Versicolor),
    ([5.0, 2.0, 3.5, 1.0], IrisClass::Versicolor),
    ([5.9, 3.0, 4.2, 1.5], IrisClass::Versicolor),
    ([6.0, 2.2, 4.0, 1.0], IrisClass::Versicolor),
    ([6.1, 2.9, 4.7, 1.4], IrisClass::Versicolor),
    ([5.6, 2.9, 3.6, 1.3], IrisClass::Versicolor),
    ([6.7, 3.1, 4.4, 1.4], IrisClass::Versicolor),
    ([5.6, 3.0, 4.5, 1.5], IrisClass::Versicolor),
    ([5.8, 2.7, 4.1, 1.0], IrisClass::Versicolor),
    ([6.2, 2.2, 4.5, 1.5], IrisClass::Versicolor),
    ([5.6, 2.5, 3.9, 1.1], IrisClass::Versicolor),
    ([5.9, 3.2, 4.8, 1.8], IrisClass::Versicolor),
    ([6.1, 2.8, 4.0, 1.3], IrisClass::Versicolor),
    ([6.3, 2.5, 4.9, 1.5], IrisClass::Versicolor),
    ([6.1, 2.8, 4.7, 1.2], IrisClass::Versicolor),
    ([6.4, 2.9, 4.3, 1.3], IrisClass::Versicolor),
    ([6.6, 3.0, 4.4, 1.4], IrisClass::Versicolor),
    ([6.8, 2.8, 4.8, 1.4], IrisClass::Versicolor),
    ([6.7, 3.0, 5.0, 1.7], IrisClass::Versicolor),
    ([6.0, 2.9, 4.5, 1.5], IrisClass::Versicolor),
    ([5.7, 2.6, 3.5, 1.0], IrisClass::Versicolor),
    ([5.5, 2.4, 3.8, 1.1], IrisClass::Versicolor),
    ([5.5, 2.4, 3.7, 1.0], IrisClass::Versicolor),
    ([5.8, 2.7, 3.9, 1.2], IrisClass::Versicolor),
    ([6.0, 2.7, 5.1, 1.6], IrisClass::Versicolor),
    ([5.4, 3.0, 4.5, 1.5], IrisClass::Versicolor),
    ([6.0, 3.4, 4.5, 1.6], IrisClass::Versicolor),
    ([6.7, 3.1, 4.7, 1.5], IrisClass::Versicolor),
    ([6.3, 2.3, 4.4, 1.3], IrisClass::Versicolor),
    ([5.6, 3.0, 4.1, 1.3], IrisClass::Versicolor),
    ([5.5, 2.5, 4.0, 1.3], IrisClass::Versicolor),
    ([5.5, 2.6, 4.4, 1.2], IrisClass::Versicolor),
    ([6.1, 3.0, 4.6, 1.4], IrisClass::Versicolor),
    ([5.8, 2.6, 4.0, 1.2], IrisClass::Versicolor),
    ([5.0, 2.3, 3.3, 1.0], IrisClass::Versicolor),
    ([5.6, 2.7, 4.2, 1.3], IrisClass::Versicolor),
    ([5.7, 3.0, 4.2, 1.2], IrisClass::Versicolor),
    ([5.7, 2.9, 4.2, 1.3], IrisClass::Versicolor),
    ([6.2, 2.9, 4.3, 1.3], IrisClass::Versicolor),
    ([5.1, 2.5, 3.0, 1.1], IrisClass::Versicolor),
    ([5.7, 2.8, 4.1, 1.3], IrisClass::Versicolor),
    ([6.3, 3.3, 6.0, 2.5], IrisClass::Virginica),
    ([5.8, 2.7, 5.1, 1.9], IrisClass::Virginica),
    ([7.1, 3.0, 5.9, 2.1], IrisClass::Virginica),
    ([6.3, 2.9, 5.6, 1.8], IrisClass::Virginica),
    ([6.5, 3.0, 5.8, 2.2], IrisClass::Virginica),
    ([7.6, 3.0, 6.6, 2.1], IrisClass::Virginica),
    ([4.9, 2.5, 4.5, 1.7], IrisClass::Virginica),
    ([7.3, 2.9, 6.3, 1.8], IrisClass::Virginica),
    ([6.7, 2.5, 5.8, 1.8], IrisClass::Virginica),
    ([7.2, 3.6, 6.1, 2.5], IrisClass::Virginica),
    ([6.5, 3.2, 5.1, 2.0], IrisClass::Virginica),
    ([6.4, 2.7, 5.3, 1.9], IrisClass::Virginica),
    ([6.8, 3.0, 5.5, 2.1], IrisClass::Virginica),
    ([5.7, 2.5, 5.0, 2.0], IrisClass::Virginica),
    ([5.8, 2.8, 5.1, 2.4], IrisClass::Virginica),
    ([6.4, 3.2, 5.3, 2.3], IrisClass::Virginica),
    ([6.5, 3.0, 5.5, 1.8], IrisClass::Virginica),
    ([7.7, 3.8, 6.7, 2.2], IrisClass::Virginica),
    ([7.7, 2.6, 6.9, 2.3], IrisClass::Virginica),
    ([6.0, 2.2, 5.0, 1.5], IrisClass::Virginica),
    ([6.9, 3.2, 5.7, 2.3], IrisClass::Virginica),
    ([5.6, 2.8, 4.9, 2.0], IrisClass::Virginica),
    ([7.7, 2.8, 6.7, 2.0], IrisClass::Virginica),
    ([6.3, 2.7, 4.9, 1.8], IrisClass::Virginica),
    ([6.7, 3.3, 5.7, 2.1], IrisClass::Virginica),
    ([7.2, 3.2, 6.0, 1.8], IrisClass::Virginica),
    ([6.2, 2.8, 4.8, 1.8], IrisClass::Virginica),
    ([6.1, 3.0, 4.9, 1.8], IrisClass::Virginica),
    ([6.4, 2.8, 5.6, 2.1], IrisClass::Virginica),
    ([7.2, 3.0, 5.8, 1.6], IrisClass::Virginica),
    ([7.4, 2.8, 6.1, 1.9], IrisClass::Virginica),
    ([7.9, 3.8, 6.4, 2.0], IrisClass::Virginica),
    ([6.4, 2.8, 5.6, 2.2], IrisClass::Virginica),
    ([6.3, 2.8, 5.1, 1.5], IrisClass::Virginica),
    ([6.1, 2.6, 5.6, 1.4], IrisClass::Virginica),
    ([7.7, 3.0, 6.1, 2.3], IrisClass::Virginica),
    ([6.3, 3.4, 5.6, 2.4], IrisClass::Virginica),
    ([6.4, 3.1, 5.5, 1.8], IrisClass::Virginica),
    ([6.0, 3.0, 4.8, 1.8], IrisClass::Virginica),
    ([6.9, 3.1, 5.4, 2.1], IrisClass::Virginica),
    ([6.7, 3.1, 5.6, 2.4], IrisClass::Virginica),
    ([6.9, 3.1, 5.1, 2.3], IrisClass::Virginica),
    ([5.8, 2.7, 5.1, 1.9], IrisClass::Virginica),
    ([6.8, 3.2, 5.9, 2.3], IrisClass::Virginica),
    ([6.7, 3.3, 5.7, 2.5], IrisClass::Virginica),
    ([6.7, 3.0, 5.2, 2.3], IrisClass::Virginica),
    ([6.3, 2.5, 5.0, 1.9], IrisClass::Virginica),
    ([6.5, 3.0, 5.2, 2.0], IrisClass::Virginica),
    ([6.2, 3.4, 5.4, 2.3], IrisClass::Virginica),
    ([5.9, 3.0, 5.1, 1.8], IrisClass::Virginica),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iris_is_balanced() {
        let data = Dataset::iris();
        assert_eq!(data.len(), 150);
        for class in IrisClass::ALL {
            let count = data.samples().iter().filter(|(_, c)| *c == class).count();
            assert_eq!(count, 50);
        }
    }

    #[test]
    fn test_iris_feature_ranges() {
        let ranges = Dataset::iris().feature_ranges();
        assert_eq!(ranges[0], (4.3, 7.9));
        assert_eq!(ranges[1], (2.0, 4.4));
        assert_eq!(ranges[2], (1.0, 6.9));
        assert_eq!(ranges[3], (0.1, 2.5));
    }

    #[test]
    fn test_stratified_split_sizes() {
        let (train, holdout) = Dataset::iris().stratified_split(5);
        assert_eq!(train.len(), 120);
        assert_eq!(holdout.len(), 30);
        let setosa = holdout
            .samples()
            .iter()
            .filter(|(_, c)| *c == IrisClass::Setosa)
            .count();
        assert_eq!(setosa, 10);
    }
}
