//! Device abstraction for tensor storage and device-resident kernels.
//!
//! A device decides where tensor data lives and how the data-movement
//! kernels run. The crate ships a single [`Cpu`] device; the trait is the
//! seam where an accelerator-backed device would plug in without touching
//! the layers above.

use crate::tensor::{Storage, TensorElem};
use std::fmt::Debug;

/// The hardware (or logical) home of a tensor's storage.
pub trait Device: Clone + Debug + PartialEq + Send + Sync {
    /// The container type holding elements on this device.
    type Storage<T>: Storage<T>
    where
        T: TensorElem;

    /// Human-readable device name.
    fn name(&self) -> &'static str;

    /// Transposes rank-2 data in place on the device.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Unsupported`](crate::tensor::TensorError) for
    /// ranks other than 2.
    fn transpose<T: TensorElem, const RANK: usize>(
        data: &Self::Storage<T>,
        shape: &[usize; RANK],
    ) -> crate::tensor::Result<Self::Storage<T>>;
}

/// The system CPU. Data lives in a `Vec<T>` in host memory; kernels are
/// parallelised across cores with rayon.
#[derive(Clone, Debug, PartialEq)]
pub struct Cpu;

impl Device for Cpu {
    type Storage<T>
        = Vec<T>
    where
        T: TensorElem;

    fn name(&self) -> &'static str {
        "CPU"
    }

    fn transpose<T: TensorElem, const RANK: usize>(
        data: &Self::Storage<T>,
        shape: &[usize; RANK],
    ) -> crate::tensor::Result<Self::Storage<T>> {
        if RANK != 2 {
            return Err(crate::tensor::TensorError::Unsupported(format!(
                "transpose requires rank 2, got rank {}",
                RANK
            )));
        }

        drugresp_kernels::cpu_transpose(data, [shape[0], shape[1]]).map_err(|e| match e {
            drugresp_kernels::KernelError::ShapeMismatch { expected, got } => {
                crate::tensor::TensorError::ShapeMismatch { expected, got }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_name() {
        assert_eq!(Cpu.name(), "CPU");
    }

    #[test]
    fn test_cpu_equality() {
        assert_eq!(Cpu, Cpu.clone());
    }

    #[test]
    fn test_cpu_transpose() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let t = Cpu::transpose(&data, &[2, 3]).unwrap();
        assert_eq!(t, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_cpu_transpose_bad_rank() {
        let data = vec![1.0, 2.0];
        let result = Cpu::transpose(&data, &[2]);
        assert!(matches!(
            result,
            Err(crate::tensor::TensorError::Unsupported(_))
        ));
    }

    #[test]
    fn test_cpu_transpose_length_mismatch() {
        let data = vec![1.0, 2.0];
        let result = Cpu::transpose(&data, &[2, 2]);
        assert!(matches!(
            result,
            Err(crate::tensor::TensorError::ShapeMismatch { .. })
        ));
    }
}
