//! Training dataset assembly
//!
//! Classes are recorded in contiguous blocks, so the concatenated batches are
//! shuffled before training. Some training algorithms are sensitive to
//! presentation order; the permutation is uniform over all orderings.

use std::collections::BTreeMap;
use std::io::{self, Write};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::{ClassId, LabeledSample};

/// Shuffled collection of labeled samples handed to the trainer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    samples: Vec<LabeledSample>,
}

impl Dataset {
    /// Concatenate per-class batches in order, then shuffle in place
    pub fn build<R: Rng + ?Sized>(batches: Vec<Vec<LabeledSample>>, rng: &mut R) -> Self {
        let mut samples: Vec<LabeledSample> = batches.into_iter().flatten().collect();
        samples.shuffle(rng);
        Self { samples }
    }

    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples per class
    pub fn class_counts(&self) -> BTreeMap<ClassId, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.label).or_insert(0) += 1;
        }
        counts
    }

    /// Write the dataset as libsvm text: one `label idx:value ...` line per
    /// sample, with 1-based feature indices.
    ///
    /// libsvm has no spelling for NaN or infinity, so a dataset holding a
    /// non-finite value fails with `InvalidData` before anything is written.
    pub fn write_libsvm<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for (i, sample) in self.samples.iter().enumerate() {
            if let Some((index, value)) = sample.features.indexed().find(|(_, v)| !v.is_finite()) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "sample {} (class {}) has value {} at feature {}",
                        i, sample.label, value, index
                    ),
                ));
            }
        }

        for sample in &self.samples {
            write!(writer, "{}", sample.label)?;
            for (index, value) in sample.features.indexed() {
                write!(writer, " {}:{}", index, value)?;
            }
            writeln!(writer)?;
        }
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureVector, FEATURE_COUNT};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample(label: ClassId, marker: f32) -> LabeledSample {
        let mut values = [0.0; FEATURE_COUNT];
        values[0] = marker;
        LabeledSample {
            label,
            features: FeatureVector::new(values),
        }
    }

    fn batches() -> Vec<Vec<LabeledSample>> {
        (1..=3)
            .map(|class| {
                (0..20)
                    .map(|i| sample(class, (class * 100 + i) as f32))
                    .collect()
            })
            .collect()
    }

    fn markers(samples: &[LabeledSample]) -> Vec<i64> {
        samples
            .iter()
            .map(|s| s.features.as_slice()[0] as i64)
            .collect()
    }

    #[test]
    fn test_build_is_permutation() {
        let input = batches();
        let mut expected = markers(&input.concat());

        let dataset = Dataset::build(input, &mut StdRng::seed_from_u64(7));
        let mut actual = markers(dataset.samples());

        assert_eq!(dataset.len(), 60);
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_build_breaks_class_blocks() {
        let input = batches();
        let concatenated = markers(&input.concat());

        let dataset = Dataset::build(input, &mut StdRng::seed_from_u64(7));
        assert_ne!(markers(dataset.samples()), concatenated);
    }

    #[test]
    fn test_same_seed_same_order() {
        let a = Dataset::build(batches(), &mut StdRng::seed_from_u64(42));
        let b = Dataset::build(batches(), &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_class_counts() {
        let dataset = Dataset::build(batches(), &mut StdRng::seed_from_u64(1));
        let counts = dataset.class_counts();
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|c| *c == 20));
    }

    #[test]
    fn test_libsvm_export() {
        let dataset = Dataset::build(vec![vec![sample(2, 1.5)]], &mut StdRng::seed_from_u64(0));
        let mut out = Vec::new();
        dataset.write_libsvm(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let line = text.lines().next().unwrap();
        assert!(line.starts_with("2 1:1.5 2:0 "));
        assert!(line.ends_with(&format!(" {}:0", FEATURE_COUNT)));
        assert_eq!(line.split(' ').count(), FEATURE_COUNT + 1);
    }

    #[test]
    fn test_libsvm_export_rejects_non_finite() {
        let mut bad = sample(1, 0.0);
        let mut values = [0.0; FEATURE_COUNT];
        values[4] = f32::INFINITY;
        bad.features = FeatureVector::new(values);
        let dataset = Dataset::build(
            vec![vec![sample(1, 1.0), bad]],
            &mut StdRng::seed_from_u64(0),
        );

        let mut out = Vec::new();
        let err = dataset.write_libsvm(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("feature 5"));
        assert!(out.is_empty());
    }
}
