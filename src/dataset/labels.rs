use std::collections::BTreeSet;

use super::sample::{Sample, FEATURE_COUNT};
use crate::error::{Error, Result};

/// Bijection between the sorted distinct labels and class ids `0..len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelIndex {
    labels: Vec<char>,
}

impl LabelIndex {
    pub fn from_samples(samples: &[Sample]) -> LabelIndex {
        let labels: BTreeSet<char> = samples.iter().map(|s| s.label).collect();
        LabelIndex {
            labels: labels.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[char] {
        &self.labels
    }

    /// Labels as strings, in class id order.
    pub fn names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.to_string()).collect()
    }

    pub fn id(&self, label: char) -> Option<usize> {
        self.labels.binary_search(&label).ok()
    }

    pub fn label(&self, id: usize) -> Option<char> {
        self.labels.get(id).copied()
    }
}

/// Features and class ids of a set of samples, ready for the network.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Arrays {
    /// Row-major, `FEATURE_COUNT` values per sample.
    pub features: Vec<f64>,
    pub targets: Vec<usize>,
}

impl Arrays {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Landmark vector of the `i`-th sample.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.features[i * FEATURE_COUNT..(i + 1) * FEATURE_COUNT]
    }

    /// The samples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Arrays {
        let mut features = Vec::with_capacity(indices.len() * FEATURE_COUNT);
        let mut targets = Vec::with_capacity(indices.len());
        for &i in indices {
            features.extend_from_slice(self.row(i));
            targets.push(self.targets[i]);
        }
        Arrays { features, targets }
    }

    /// Number of samples of every class id below `classes`.
    pub fn class_counts(&self, classes: usize) -> Vec<usize> {
        let mut counts = vec![0; classes];
        for &t in &self.targets {
            counts[t] += 1;
        }
        counts
    }
}

/// Builds the label index and the numeric arrays for `samples`.
///
/// Fails unless there are at least two labels and every label has at least two
/// samples, which the stratified split needs.
pub fn build_xy(samples: &[Sample]) -> Result<(Arrays, LabelIndex)> {
    let index = LabelIndex::from_samples(samples);

    let mut features = Vec::with_capacity(samples.len() * FEATURE_COUNT);
    let mut targets = Vec::with_capacity(samples.len());
    for sample in samples {
        features.extend_from_slice(&sample.x);
        // Every label of `samples` is in the index built from them
        targets.push(index.id(sample.label).unwrap_or_default());
    }
    let arrays = Arrays { features, targets };

    if index.len() < 2 {
        return Err(Error::data("Need at least 2 distinct labels to train"));
    }

    for (id, &count) in arrays.class_counts(index.len()).iter().enumerate() {
        if count < 2 {
            return Err(Error::data(format!(
                "Label '{}' has only {} sample(s). Add more samples for stratified split.",
                index.labels[id], count
            )));
        }
    }

    Ok((arrays, index))
}
