//! Parameter optimisers.

pub mod sgd;
pub use sgd::Sgd;

use crate::tensor::{Cpu, Result, Tensor, TensorElem};

/// Updates model parameters from computed gradients.
///
/// The training loop walks the model's parameters and calls `update` once
/// per parameter/gradient pair; optimisers are stateless with respect to
/// which parameter they are handed.
pub trait Optimizer<T: TensorElem> {
    /// Applies one update step to a single parameter.
    ///
    /// # Errors
    ///
    /// Returns a shape error if the parameter and gradient shapes differ.
    fn update<const RANK: usize>(
        &self,
        param: &mut Tensor<T, RANK, Cpu>,
        grad: &Tensor<T, RANK, Cpu>,
    ) -> Result<()>;
}
