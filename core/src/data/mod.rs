//! Data pipeline: datasets, samplers, batching, feature scaling, and the
//! synthetic drug-response source.
//!
//! The pieces compose the way the training scripts consume them: a
//! [`Dataset`] supplies items, a [`Sampler`](sampler::Sampler) decides
//! their order, a [`DataLoader`] batches and collates them, and a
//! [`BatchStream`](loader::BatchStream) repeats the loader forever so the
//! training loop can pull a fixed number of steps.

pub mod loader;
pub mod response;
pub mod sampler;
pub mod scaling;

pub use loader::{BatchStream, Collate, DataLoader, DefaultCollate, ResponseCollate};
pub use response::{LoaderConfig, Partition, ResponseLoader};
pub use sampler::{RandomSampler, Sampler, SequentialSampler};
pub use scaling::Scaling;

use crate::tensor::{Cpu, Result, Tensor, TensorError};

/// Random access to data items.
pub trait Dataset<T>: Send + Sync {
    /// Total number of items.
    fn len(&self) -> usize;

    /// Whether the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The item at `index`.
    ///
    /// # Panics
    ///
    /// May panic if `index` is out of bounds.
    fn get(&self, index: usize) -> T;
}

impl<T: Clone + Send + Sync> Dataset<T> for Vec<T> {
    fn len(&self) -> usize {
        self.len()
    }

    fn get(&self, index: usize) -> T {
        self[index].clone()
    }
}

/// One training batch: a feature matrix and its scalar labels.
#[derive(Clone, Debug)]
pub struct Batch {
    /// Shape `[batch_size, features]`.
    pub features: Tensor<f32, 2, Cpu>,
    /// Shape `[batch_size]`.
    pub labels: Tensor<f32, 1, Cpu>,
}

impl Batch {
    /// Number of examples in the batch.
    pub fn batch_size(&self) -> usize {
        self.features.shape()[0]
    }

    /// Feature width.
    pub fn feature_dim(&self) -> usize {
        self.features.shape()[1]
    }

    /// The row range belonging to one replica of a mirrored run.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidConfig`] if the batch does not divide
    /// evenly across `world` replicas, or if `rank >= world`.
    pub fn shard(&self, rank: usize, world: usize) -> Result<Batch> {
        let batch = self.batch_size();
        if world == 0 || rank >= world {
            return Err(TensorError::InvalidConfig(format!(
                "shard rank {} out of range for world size {}",
                rank, world
            )));
        }
        if batch % world != 0 {
            return Err(TensorError::InvalidConfig(format!(
                "batch size {} does not divide evenly across {} replicas",
                batch, world
            )));
        }

        let per = batch / world;
        let dim = self.feature_dim();
        let rows = rank * per..(rank + 1) * per;

        let features = self.features.data()[rows.start * dim..rows.end * dim].to_vec();
        let labels = self.labels.data()[rows.clone()].to_vec();

        Ok(Batch {
            features: Tensor::new(features, [per, dim])?,
            labels: Tensor::new(labels, [per])?,
        })
    }
}
