use nalgebra::DMatrix;
use tracing::debug;

use crate::random::PrngKey;
use crate::util::{one_hot, MlError, Result};

pub mod mnist;

/// Labelled examples, one row of `features` per example.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: DMatrix<f64>,
    pub labels: Vec<usize>,
    pub num_classes: usize,
}

/// A subset of a [`Dataset`]; same layout.
pub type Batch = Dataset;

impl Dataset {
    pub fn new(features: DMatrix<f64>, labels: Vec<usize>, num_classes: usize) -> Result<Self> {
        if features.nrows() != labels.len() {
            Err(MlError::ShapeMismatch {
                expected: format!("{} labels", features.nrows()),
                found: format!("{} labels", labels.len()),
            })?
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= num_classes) {
            Err(MlError::InvalidLabel { label, num_classes })?
        }

        Ok(Self { features, labels, num_classes })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.features.ncols()
    }

    /// One-hot targets, one row per example.
    pub fn targets(&self) -> Result<DMatrix<f64>> {
        let mut targets = DMatrix::zeros(self.len(), self.num_classes);
        for (i, &label) in self.labels.iter().enumerate() {
            targets.set_row(i, &one_hot(label, self.num_classes)?.transpose());
        }
        Ok(targets)
    }

    pub fn select(&self, indices: &[usize]) -> Batch {
        Dataset {
            features: self.features.select_rows(indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            num_classes: self.num_classes,
        }
    }

    /// Keep only the first `n` examples.
    pub fn truncate(self, n: usize) -> Self {
        if n >= self.len() {
            return self;
        }
        let indices = (0..n).collect::<Vec<_>>();
        self.select(&indices)
    }

    // (x - mean) / sd for every feature
    pub fn standardize(&mut self, mean: f64, sd: f64) {
        self.features.apply(|x| *x = (*x - mean) / sd);
    }
}

/// Splits a dataset into batches, optionally reshuffling every epoch.
#[derive(Debug, Clone)]
pub struct DataLoader<'a> {
    dataset: &'a Dataset,
    batch_size: usize,
    shuffle: bool,
}

impl<'a> DataLoader<'a> {
    pub fn new(dataset: &'a Dataset, batch_size: usize, shuffle: bool) -> Result<Self> {
        if dataset.is_empty() {
            Err(MlError::EmptyDataset)?
        }

        Ok(Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle,
        })
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Batches for one pass over the data. `key` only matters when shuffling.
    pub fn batches(&self, key: PrngKey) -> impl Iterator<Item = Batch> + 'a {
        let order = if self.shuffle {
            key.permutation(self.dataset.len())
        } else {
            (0..self.dataset.len()).collect()
        };
        self.batches_in(order)
    }

    /// Batches in dataset order, ignoring `shuffle`.
    pub fn iter(&self) -> impl Iterator<Item = Batch> + 'a {
        self.batches_in((0..self.dataset.len()).collect())
    }

    fn batches_in(&self, order: Vec<usize>) -> impl Iterator<Item = Batch> + 'a {
        debug!(batches = self.num_batches(), shuffle = self.shuffle, "loading batches");

        let dataset = self.dataset;
        let chunks = order
            .chunks(self.batch_size)
            .map(|c| c.to_vec())
            .collect::<Vec<_>>();
        chunks.into_iter().map(move |indices| dataset.select(&indices))
    }
}

/// Two Gaussian blobs centred at `(-2, -2, ...)` and `(2, 2, ...)`;
/// linearly separable with overwhelming probability.
pub fn toy_separable(key: PrngKey, n: usize, dim: usize) -> Result<Dataset> {
    let (noise_key, label_key) = key.split();
    let noise = noise_key.normal_matrix(n, dim) * 0.5;
    let labels = label_key
        .permutation(n)
        .into_iter()
        .map(|i| i % 2)
        .collect::<Vec<_>>();

    let features = DMatrix::from_fn(n, dim, |i, j| {
        let centre = if labels[i] == 0 { -2.0 } else { 2.0 };
        centre + noise[(i, j)]
    });

    Dataset::new(features, labels, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_dataset(n: usize) -> Dataset {
        let features = DMatrix::from_fn(n, 2, |i, j| (i * 2 + j) as f64);
        let labels = (0..n).map(|i| i % 3).collect();
        Dataset::new(features, labels, 3).unwrap()
    }

    #[test]
    fn targets_are_one_hot() {
        let ds = counting_dataset(5);
        let targets = ds.targets().unwrap();
        assert_eq!(targets.shape(), (5, 3));
        for (i, row) in targets.row_iter().enumerate() {
            assert_eq!(row.sum(), 1.0);
            assert_eq!(row[ds.labels[i]], 1.0);
        }
    }

    #[test]
    fn rejects_labels_out_of_range() {
        let features = DMatrix::zeros(2, 1);
        assert!(matches!(
            Dataset::new(features, vec![0, 4], 3),
            Err(MlError::InvalidLabel { label: 4, num_classes: 3 })
        ));
    }

    #[test]
    fn loader_covers_every_example_once() {
        let ds = counting_dataset(10);
        let loader = DataLoader::new(&ds, 3, true).unwrap();
        assert_eq!(loader.num_batches(), 4);

        let batches = loader.batches(PrngKey::new(1)).collect::<Vec<_>>();
        assert_eq!(batches.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![3, 3, 3, 1]);

        // first feature of row i is 2i, so it identifies the example
        let mut seen = batches
            .iter()
            .flat_map(|b| b.features.column(0).iter().map(|&v| v as usize / 2).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn shuffle_is_reproducible() {
        let ds = counting_dataset(20);
        let loader = DataLoader::new(&ds, 4, true).unwrap();
        let a = loader.batches(PrngKey::new(9)).map(|b| b.labels).collect::<Vec<_>>();
        let b = loader.batches(PrngKey::new(9)).map(|b| b.labels).collect::<Vec<_>>();
        assert_eq!(a, b);
    }

    #[test]
    fn unshuffled_loader_keeps_order() {
        let ds = counting_dataset(4);
        let loader = DataLoader::new(&ds, 4, false).unwrap();
        let batch = loader.batches(PrngKey::new(0)).next().unwrap();
        assert_eq!(batch.features, ds.features);
    }

    #[test]
    fn targets_reject_labels_changed_after_construction() {
        let mut ds = counting_dataset(3);
        ds.labels[1] = 7;
        assert!(matches!(ds.targets(), Err(MlError::InvalidLabel { label: 7, num_classes: 3 })));
    }

    #[test]
    fn iter_ignores_shuffle_flag() {
        let ds = counting_dataset(7);
        let loader = DataLoader::new(&ds, 3, true).unwrap();
        let labels = loader.iter().flat_map(|b| b.labels).collect::<Vec<_>>();
        assert_eq!(labels, ds.labels);
        assert_eq!(loader.iter().count(), 3);
    }

    #[test]
    fn standardize_shifts_and_scales() {
        let mut ds = counting_dataset(2);
        ds.standardize(1.0, 2.0);
        assert_eq!(ds.features[(0, 0)], -0.5);
        assert_eq!(ds.features[(1, 1)], 1.0);
    }

    #[test]
    fn toy_data_is_balanced() {
        let ds = toy_separable(PrngKey::new(4), 40, 2).unwrap();
        assert_eq!(ds.labels.iter().filter(|&&l| l == 1).count(), 20);
    }
}
