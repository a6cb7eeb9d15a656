//! Classifier boundary
//!
//! Training and prediction are opaque capabilities behind [`Trainer`] and
//! [`Classifier`], so the pipeline does not depend on any particular
//! learning algorithm. [`CentroidTrainer`] is the implementation bundled
//! with the CLI.

use std::collections::BTreeMap;

use crate::dataset::Dataset;
use crate::error::TrainingError;
use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::types::ClassId;

/// Produces a model from a labeled dataset
pub trait Trainer {
    type Model: Classifier;

    fn train(&self, dataset: &Dataset) -> Result<Self::Model, TrainingError>;
}

/// A trained model
pub trait Classifier {
    fn predict(&self, features: &FeatureVector) -> ClassId;
}

/// Nearest-centroid trainer over standardized features
#[derive(Debug, Clone, Copy, Default)]
pub struct CentroidTrainer;

/// Model produced by [`CentroidTrainer`]
#[derive(Debug, Clone, PartialEq)]
pub struct CentroidModel {
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
    /// Ordered by class id, so ties resolve to the lowest id
    centroids: Vec<(ClassId, [f64; FEATURE_COUNT])>,
}

impl Trainer for CentroidTrainer {
    type Model = CentroidModel;

    fn train(&self, dataset: &Dataset) -> Result<CentroidModel, TrainingError> {
        if dataset.is_empty() {
            return Err(TrainingError("dataset is empty".to_string()));
        }

        for (i, sample) in dataset.samples().iter().enumerate() {
            if let Some(pos) = sample.features.as_slice().iter().position(|v| !v.is_finite()) {
                return Err(TrainingError(format!(
                    "sample {} (class {}) has a non-finite value at feature {}",
                    i,
                    sample.label,
                    pos + 1
                )));
            }
        }

        let n = dataset.len() as f64;

        let mut mean = [0.0; FEATURE_COUNT];
        for sample in dataset.samples() {
            for (m, v) in mean.iter_mut().zip(sample.features.as_slice()) {
                *m += *v as f64;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut scale = [0.0; FEATURE_COUNT];
        for sample in dataset.samples() {
            for ((s, m), v) in scale.iter_mut().zip(&mean).zip(sample.features.as_slice()) {
                *s += (*v as f64 - m).powi(2);
            }
        }
        for s in scale.iter_mut() {
            let std = (*s / n).sqrt();
            // Constant features carry no information; leave them unscaled
            *s = if std > f64::EPSILON { std } else { 1.0 };
        }

        let mut sums: BTreeMap<ClassId, ([f64; FEATURE_COUNT], usize)> = BTreeMap::new();
        for sample in dataset.samples() {
            let z = standardize(&sample.features, &mean, &scale);
            let (sum, count) = sums
                .entry(sample.label)
                .or_insert(([0.0; FEATURE_COUNT], 0));
            for (acc, v) in sum.iter_mut().zip(z.iter()) {
                *acc += v;
            }
            *count += 1;
        }

        let centroids = sums
            .into_iter()
            .map(|(label, (mut sum, count))| {
                sum.iter_mut().for_each(|v| *v /= count as f64);
                (label, sum)
            })
            .collect();

        Ok(CentroidModel {
            mean,
            scale,
            centroids,
        })
    }
}

impl CentroidModel {
    /// Class ids known to the model
    pub fn classes(&self) -> Vec<ClassId> {
        self.centroids.iter().map(|(id, _)| *id).collect()
    }
}

impl Classifier for CentroidModel {
    fn predict(&self, features: &FeatureVector) -> ClassId {
        let z = standardize(features, &self.mean, &self.scale);

        let mut best = self.centroids[0].0;
        let mut best_distance = f64::INFINITY;
        for (label, centroid) in &self.centroids {
            let distance: f64 = centroid
                .iter()
                .zip(z.iter())
                .map(|(c, v)| (c - v).powi(2))
                .sum();
            if distance < best_distance {
                best = *label;
                best_distance = distance;
            }
        }
        best
    }
}

fn standardize(
    features: &FeatureVector,
    mean: &[f64; FEATURE_COUNT],
    scale: &[f64; FEATURE_COUNT],
) -> [f64; FEATURE_COUNT] {
    let mut z = [0.0; FEATURE_COUNT];
    for (i, v) in features.as_slice().iter().enumerate() {
        z[i] = (*v as f64 - mean[i]) / scale[i];
    }
    z
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LabeledSample;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn vector(mouth_open: f32, jitter: f32) -> FeatureVector {
        let mut values = [0.5; FEATURE_COUNT];
        values[24] = mouth_open;
        values[0] += jitter;
        FeatureVector::new(values)
    }

    fn dataset() -> Dataset {
        let closed: Vec<_> = (0..10)
            .map(|i| LabeledSample {
                label: 1,
                features: vector(0.05, i as f32 * 0.01),
            })
            .collect();
        let open: Vec<_> = (0..10)
            .map(|i| LabeledSample {
                label: 2,
                features: vector(0.9, i as f32 * 0.01),
            })
            .collect();
        Dataset::build(vec![closed, open], &mut StdRng::seed_from_u64(3))
    }

    #[test]
    fn test_separates_classes() {
        let model = CentroidTrainer.train(&dataset()).unwrap();

        assert_eq!(model.classes(), vec![1, 2]);
        assert_eq!(model.predict(&vector(0.1, 0.02)), 1);
        assert_eq!(model.predict(&vector(0.8, 0.05)), 2);
    }

    #[test]
    fn test_empty_dataset_fails() {
        let result = CentroidTrainer.train(&Dataset::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_non_finite_values_fail() {
        let mut values = [0.0; FEATURE_COUNT];
        values[3] = f32::NAN;
        let ds = Dataset::build(
            vec![vec![LabeledSample {
                label: 1,
                features: FeatureVector::new(values),
            }]],
            &mut StdRng::seed_from_u64(0),
        );

        let err = CentroidTrainer.train(&ds).unwrap_err();
        assert!(err.0.contains("feature 4"));
    }

    #[test]
    fn test_single_class_always_predicted() {
        let samples = vec![LabeledSample {
            label: 5,
            features: vector(0.3, 0.0),
        }];
        let ds = Dataset::build(vec![samples], &mut StdRng::seed_from_u64(0));
        let model = CentroidTrainer.train(&ds).unwrap();
        assert_eq!(model.predict(&vector(0.9, 0.4)), 5);
    }
}
