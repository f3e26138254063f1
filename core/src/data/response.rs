//! Deterministic synthetic drug-response source.
//!
//! The real pipeline reads cell-line expression profiles and drug
//! descriptors from an external loader; that loader is out of scope here,
//! so this module generates a deterministic stand-in with the same
//! surface: partitioned examples of a fixed feature width, a dose column
//! bounded by a log-concentration window, optional feature subsampling,
//! and scaling fitted on the training partition.

use super::loader::{BatchStream, DataLoader};
use super::{RandomSampler, Scaling, SequentialSampler};
use crate::tensor::{Result, TensorError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Which split of the data a stream draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Partition {
    Train,
    Val,
    Test,
}

/// Configuration of the synthetic source.
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Total number of generated examples.
    pub samples: usize,
    /// Feature width before subsampling (dose column included).
    pub input_dim: usize,
    /// Fraction of the non-test examples held out for validation.
    pub val_split: f32,
    /// Fraction of all examples held out for the test partition.
    pub test_split: f32,
    /// If non-zero, keep only this many randomly chosen feature columns.
    pub feature_subsample: usize,
    /// Feature-scaling mode; `None` leaves features raw.
    pub scaling: Option<Scaling>,
    /// Lower bound of the log-concentration dose window.
    pub min_logconc: f32,
    /// Upper bound of the log-concentration dose window.
    pub max_logconc: f32,
    /// Seed for generation, splitting, subsampling, and epoch shuffling.
    pub seed: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            samples: 1000,
            input_dim: 128,
            val_split: 0.2,
            test_split: 0.15,
            feature_subsample: 0,
            scaling: Some(Scaling::Std),
            min_logconc: -5.0,
            max_logconc: -4.0,
            seed: 2016,
        }
    }
}

/// Partitioned, scaled examples ready to stream as batches.
pub struct ResponseLoader {
    rows: Vec<Vec<f32>>,
    labels: Vec<f32>,
    train_idx: Vec<usize>,
    val_idx: Vec<usize>,
    test_idx: Vec<usize>,
    input_dim: usize,
    seed: u64,
}

impl ResponseLoader {
    /// Generates, splits, subsamples, and scales the dataset.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidConfig`] for an empty dataset, a
    /// feature width below 2 (dose plus at least one profile column), an
    /// inverted dose window, or splits that leave no training data.
    pub fn new(config: LoaderConfig) -> Result<Self> {
        if config.samples == 0 {
            return Err(TensorError::InvalidConfig(
                "samples must be positive".to_string(),
            ));
        }
        if config.input_dim < 2 {
            return Err(TensorError::InvalidConfig(format!(
                "input_dim must be at least 2, got {}",
                config.input_dim
            )));
        }
        if config.min_logconc >= config.max_logconc {
            return Err(TensorError::InvalidConfig(format!(
                "empty log-concentration window [{}, {}]",
                config.min_logconc, config.max_logconc
            )));
        }
        if !(0.0..1.0).contains(&config.val_split) || !(0.0..1.0).contains(&config.test_split) {
            return Err(TensorError::InvalidConfig(
                "splits must lie in [0, 1)".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);

        // Latent response weights tie features to labels so the data is
        // actually learnable.
        let profile_dim = config.input_dim - 1;
        let latent: Vec<f32> = (0..profile_dim).map(|_| rng.random_range(-1.0..1.0)).collect();
        let norm = (profile_dim as f32).sqrt();
        let dose_range = config.max_logconc - config.min_logconc;

        let mut rows = Vec::with_capacity(config.samples);
        let mut labels = Vec::with_capacity(config.samples);
        for _ in 0..config.samples {
            let dose: f32 = rng.random_range(config.min_logconc..config.max_logconc);
            let profile: Vec<f32> = (0..profile_dim).map(|_| rng.random_range(-1.0..1.0)).collect();

            // Growth response: a linear effect of the profile, suppressed
            // as the dose rises through the window.
            let effect: f32 = latent.iter().zip(&profile).map(|(w, x)| w * x).sum();
            let dose_norm = (dose - config.min_logconc) / dose_range;
            labels.push(effect / norm - 0.5 * dose_norm);

            let mut row = Vec::with_capacity(config.input_dim);
            row.push(dose);
            row.extend(profile);
            rows.push(row);
        }

        // Optional random feature subsampling.
        let mut input_dim = config.input_dim;
        if config.feature_subsample > 0 && config.feature_subsample < config.input_dim {
            let mut columns: Vec<usize> = (0..config.input_dim).collect();
            columns.shuffle(&mut rng);
            let mut keep = columns[..config.feature_subsample].to_vec();
            keep.sort_unstable();

            rows = rows
                .into_iter()
                .map(|row| keep.iter().map(|&c| row[c]).collect())
                .collect();
            input_dim = config.feature_subsample;
        }

        // Partition: test first, then validation from the remainder.
        let mut indices: Vec<usize> = (0..config.samples).collect();
        indices.shuffle(&mut rng);

        let test_len = (config.samples as f32 * config.test_split) as usize;
        let val_len = ((config.samples - test_len) as f32 * config.val_split) as usize;

        let test_idx = indices[..test_len].to_vec();
        let val_idx = indices[test_len..test_len + val_len].to_vec();
        let train_idx = indices[test_len + val_len..].to_vec();

        if train_idx.is_empty() {
            return Err(TensorError::InvalidConfig(
                "splits leave no training examples".to_string(),
            ));
        }

        // Fit scaling on the training partition only, apply everywhere.
        if let Some(scaling) = config.scaling {
            let train_rows: Vec<Vec<f32>> =
                train_idx.iter().map(|&i| rows[i].clone()).collect();
            let scaler = scaling.fit(&train_rows)?;
            scaler.apply(&mut rows)?;
        }

        Ok(Self {
            rows,
            labels,
            train_idx,
            val_idx,
            test_idx,
            input_dim,
            seed: config.seed,
        })
    }

    /// Feature width after subsampling.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Number of examples in a partition.
    pub fn len(&self, partition: Partition) -> usize {
        self.indices(partition).len()
    }

    /// Whether a partition is empty.
    pub fn is_empty(&self, partition: Partition) -> bool {
        self.len(partition) == 0
    }

    /// Full batches per epoch at the given batch size.
    pub fn steps_per_epoch(&self, partition: Partition, batch_size: usize) -> usize {
        self.len(partition) / batch_size
    }

    /// An endless batch stream over a partition.
    ///
    /// Training streams reshuffle per epoch with a seed derived from the
    /// loader seed; validation and test streams are sequential. Batches
    /// always have exactly `batch_size` rows.
    pub fn flow(&self, partition: Partition, batch_size: usize) -> BatchStream<Vec<(Vec<f32>, f32)>> {
        let items: Vec<(Vec<f32>, f32)> = self
            .indices(partition)
            .iter()
            .map(|&i| (self.rows[i].clone(), self.labels[i]))
            .collect();

        let loader = DataLoader::new(items, batch_size).drop_last(true);
        let loader = match partition {
            Partition::Train => loader.with_sampler(RandomSampler::new(self.seed)),
            Partition::Val | Partition::Test => loader.with_sampler(SequentialSampler),
        };

        BatchStream::new(loader.collate_with())
    }

    fn indices(&self, partition: Partition) -> &[usize] {
        match partition {
            Partition::Train => &self.train_idx,
            Partition::Val => &self.val_idx,
            Partition::Test => &self.test_idx,
        }
    }
}
