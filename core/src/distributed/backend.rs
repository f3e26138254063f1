//! The collective-communication interface.

use crate::tensor::{Cpu, Result, Tensor, TensorElem};

/// A communication backend for one member of a replica group.
///
/// Implementations carry their rank and the group size and provide the
/// collective operations the training loop needs. The trait is generic
/// over the element type so a backend's channels can be typed end to end.
pub trait CollectiveBackend<T: TensorElem>: Send {
    /// This member's rank, in `0..world_size`.
    fn rank(&self) -> usize;

    /// Number of members in the group.
    fn world_size(&self) -> usize;

    /// Element-wise sum of `tensor` across all members; every member
    /// receives the full result.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Distributed`](crate::tensor::TensorError)
    /// if a peer has disconnected mid-collective.
    fn all_reduce_sum<const RANK: usize>(
        &self,
        tensor: &Tensor<T, RANK, Cpu>,
    ) -> Result<Tensor<T, RANK, Cpu>>;
}
