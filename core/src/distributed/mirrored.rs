//! The mirrored data-parallel strategy.

use super::backend::CollectiveBackend;
use crate::tensor::{Cpu, Result, Tensor, TensorElem, TensorError};

/// Replicates training across a list of named logical devices.
///
/// The strategy itself is configuration: the device names fix the number
/// of replicas, and the estimator consults it to shard each global batch
/// and to spin up one replica (with its collective backend) per device.
/// Per step, every replica computes gradients on its shard, the gradients
/// are averaged with [`all_reduce_mean`], and every replica applies the
/// same update, so the mirrored weights stay bit-identical.
#[derive(Clone, Debug)]
pub struct MirroredStrategy {
    devices: Vec<String>,
}

impl MirroredStrategy {
    /// Creates a strategy over the given device names.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidConfig`] if the list is empty.
    pub fn new<S: Into<String>>(devices: impl IntoIterator<Item = S>) -> Result<Self> {
        let devices: Vec<String> = devices.into_iter().map(Into::into).collect();
        if devices.is_empty() {
            return Err(TensorError::InvalidConfig(
                "mirrored strategy needs at least one device".to_string(),
            ));
        }
        Ok(Self { devices })
    }

    /// Number of replicas (one per device).
    pub fn num_replicas(&self) -> usize {
        self.devices.len()
    }

    /// The configured device names, in rank order.
    pub fn devices(&self) -> &[String] {
        &self.devices
    }
}

/// Lists the logical devices available on this host, named `cpu:N`.
///
/// Replicas are CPU thread groups, so the count comes from the hardware
/// parallelism the OS reports.
pub fn available_devices() -> Vec<String> {
    let count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (0..count).map(|i| format!("cpu:{}", i)).collect()
}

/// All-reduces `tensor` and divides by the world size: the gradient
/// average a mirrored step applies on every replica.
pub fn all_reduce_mean<T, B, const RANK: usize>(
    backend: &B,
    tensor: &Tensor<T, RANK, Cpu>,
) -> Result<Tensor<T, RANK, Cpu>>
where
    T: TensorElem,
    B: CollectiveBackend<T>,
{
    let sum = backend.all_reduce_sum(tensor)?;
    let world = T::from_usize(backend.world_size()).ok_or_else(|| {
        TensorError::Unsupported("world size not representable in element type".to_string())
    })?;
    Ok(sum.map(move |x| x / world))
}
