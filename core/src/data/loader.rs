//! Batching: the data loader and the repeating batch stream.

use super::{Batch, Dataset, Sampler, SequentialSampler};
use crate::tensor::Tensor;
use std::sync::Arc;

/// Turns a list of items into one batch.
pub trait Collate<T> {
    /// The batched output type.
    type Output;

    /// Collates a vector of items into a single batch.
    fn collate(batch: Vec<T>) -> Self::Output;
}

/// Pass-through collation: the batch is just the `Vec` of items.
pub struct DefaultCollate;

impl<T> Collate<T> for DefaultCollate {
    type Output = Vec<T>;

    fn collate(batch: Vec<T>) -> Self::Output {
        batch
    }
}

/// Collates `(feature_row, label)` pairs into a [`Batch`] of tensors.
pub struct ResponseCollate;

impl Collate<(Vec<f32>, f32)> for ResponseCollate {
    type Output = Batch;

    /// # Panics
    ///
    /// Panics if the batch is empty or the feature rows are ragged.
    fn collate(batch: Vec<(Vec<f32>, f32)>) -> Batch {
        let batch_size = batch.len();
        let dim = batch[0].0.len();

        let mut features = Vec::with_capacity(batch_size * dim);
        let mut labels = Vec::with_capacity(batch_size);
        for (row, label) in batch {
            features.extend_from_slice(&row);
            labels.push(label);
        }

        Batch {
            features: Tensor::new(features, [batch_size, dim]).unwrap(),
            labels: Tensor::new(labels, [batch_size]).unwrap(),
        }
    }
}

/// Combines a dataset, a sampler, and a collator into an iterable source
/// of batches.
pub struct DataLoader<D, T, C = DefaultCollate>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    dataset: Arc<D>,
    batch_size: usize,
    sampler: Box<dyn Sampler>,
    drop_last: bool,
    _marker: std::marker::PhantomData<(T, C)>,
}

impl<D, T> DataLoader<D, T, DefaultCollate>
where
    D: Dataset<T> + 'static,
{
    /// Creates a sequential, pass-through loader.
    pub fn new(dataset: D, batch_size: usize) -> Self {
        Self {
            dataset: Arc::new(dataset),
            batch_size,
            sampler: Box::new(SequentialSampler),
            drop_last: false,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<D, T, C> DataLoader<D, T, C>
where
    D: Dataset<T> + 'static,
    C: Collate<T>,
{
    /// Replaces the sampling strategy.
    pub fn with_sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Drops the final batch of an epoch when it is smaller than
    /// `batch_size`, so every emitted batch has the exact configured size.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Switches the collator, keeping dataset, sampler, and batching.
    pub fn collate_with<C2: Collate<T>>(self) -> DataLoader<D, T, C2> {
        DataLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            sampler: self.sampler,
            drop_last: self.drop_last,
            _marker: std::marker::PhantomData,
        }
    }

    /// One epoch over the dataset in the sampler's current order.
    pub fn iter(&self) -> DataLoaderIter<D, T, C> {
        DataLoaderIter {
            dataset: self.dataset.clone(),
            indices: self.sampler.sample(self.dataset.len()),
            batch_size: self.batch_size,
            cursor: 0,
            drop_last: self.drop_last,
            _marker: std::marker::PhantomData,
        }
    }
}

/// Iterator over one epoch of batches.
pub struct DataLoaderIter<D, T, C>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    dataset: Arc<D>,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    drop_last: bool,
    _marker: std::marker::PhantomData<(T, C)>,
}

impl<D, T, C> Iterator for DataLoaderIter<D, T, C>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    type Item = C::Output;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.indices.len().saturating_sub(self.cursor);
        if remaining == 0 || (self.drop_last && remaining < self.batch_size) {
            return None;
        }

        let take = remaining.min(self.batch_size);
        let batch_indices = &self.indices[self.cursor..self.cursor + take];
        self.cursor += take;

        let batch: Vec<T> = batch_indices
            .iter()
            .map(|&idx| self.dataset.get(idx))
            .collect();

        Some(C::collate(batch))
    }
}

/// An endlessly repeating stream of [`Batch`]es over a loader.
///
/// When an epoch is exhausted the stream asks the loader for a fresh
/// epoch (resampling through the loader's sampler) and continues: the
/// dataset-from-generator-with-repeat the training loop consumes. The
/// stream only ends if the loader cannot produce a single batch.
pub struct BatchStream<D>
where
    D: Dataset<(Vec<f32>, f32)> + 'static,
{
    loader: DataLoader<D, (Vec<f32>, f32), ResponseCollate>,
    epoch: DataLoaderIter<D, (Vec<f32>, f32), ResponseCollate>,
}

impl<D> BatchStream<D>
where
    D: Dataset<(Vec<f32>, f32)> + 'static,
{
    pub fn new(loader: DataLoader<D, (Vec<f32>, f32), ResponseCollate>) -> Self {
        let epoch = loader.iter();
        Self { loader, epoch }
    }
}

impl<D> Iterator for BatchStream<D>
where
    D: Dataset<(Vec<f32>, f32)> + 'static,
{
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if let Some(batch) = self.epoch.next() {
            return Some(batch);
        }

        self.epoch = self.loader.iter();
        self.epoch.next()
    }
}
