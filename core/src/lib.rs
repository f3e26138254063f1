//! # drugresp
//!
//! A compact CPU training stack for fully-connected drug-response
//! regression models. The crate provides the pieces a training script
//! needs and nothing more:
//!
//! - [`mod@tensor`]: N-dimensional row-major tensors with rayon-parallel ops.
//! - [`autograd`]: reverse-mode automatic differentiation over [`Variable`]s.
//! - [`nn`]: the bias-free dense layer the model family is built from.
//! - [`loss`] / [`optim`]: mean-squared-error objective and plain SGD.
//! - [`data`]: dataset/sampler/loader pipeline, feature scaling, and a
//!   deterministic synthetic drug-response source.
//! - [`distributed`]: a ring all-reduce collective backend and the
//!   mirrored data-parallel strategy built on it.
//! - [`estimator`]: train / evaluate / predict orchestration with
//!   checkpointing to a model directory.
//!
//! ## Example
//!
//! ```rust
//! use drugresp::tensor::Tensor;
//!
//! let t = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0], [2, 2]).unwrap();
//! assert_eq!(t.shape(), &[2, 2]);
//! ```

/// Creates a [`tensor::Tensor`] from literal data with a compile-time check
/// that the data length matches the shape product.
///
/// ```rust
/// use drugresp::tensor;
///
/// let t = tensor!([1.0f32, 2.0, 3.0, 4.0], [2, 2]);
/// assert_eq!(t.shape(), &[2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($data:expr, $shape:expr) => {{
        const DATA_LEN: usize = (&$data as &[_]).len();
        const SHAPE: [usize; (&$shape as &[_]).len()] = $shape;
        const EXPECTED: usize = {
            let mut size = 1;
            let mut i = 0;
            while i < (&SHAPE as &[_]).len() {
                size *= SHAPE[i];
                i += 1;
            }
            size
        };

        const _: () = assert!(
            DATA_LEN == EXPECTED,
            "Shape mismatch: data length does not match shape product"
        );

        // Checked at compile time above.
        $crate::tensor::Tensor::new($data.to_vec(), $shape).unwrap()
    }};
}

pub mod autograd;
pub mod checkpoint;
pub mod data;
pub mod distributed;
pub mod estimator;
pub mod loss;
pub mod nn;
pub mod optim;
pub mod tensor;

pub use autograd::Variable;
pub use tensor::{Cpu, Device, Storage, Tensor, TensorElem, TensorError};
