//! Core tensor implementation.
//!
//! A [`Tensor`] is an N-dimensional array defined by a flat storage buffer,
//! a shape, and row-major strides. The rank is a const generic, the element
//! type and device are ordinary generics. Shape agreement between data and
//! shape is enforced at construction; mismatches between operands are
//! runtime [`TensorError`]s, never undefined behaviour.

use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;
use thiserror::Error;

pub mod device;
pub mod ops;
pub mod storage;

pub use device::{Cpu, Device};
pub use storage::Storage;

/// Error type shared across the crate.
#[derive(Error, Debug)]
pub enum TensorError {
    /// The shape of the data does not match the expected shape.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// The requested operation is not supported for this rank or device.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// A configuration value is inconsistent (bad split, empty device list, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Saving or restoring a checkpoint failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
    /// A collective operation or replica failed.
    #[error("Distributed error: {0}")]
    Distributed(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;

/// Trait bound for elements that can be stored in a [`Tensor`].
///
/// `Copy` keeps storage contiguous and element access cheap; `Send + Sync`
/// is required for rayon parallelism; the `num_traits` bounds provide the
/// arithmetic and numeric conversions the training stack needs.
pub trait TensorElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> TensorElem for T where
    T: Num
        + NumAssign
        + Copy
        + Clone
        + Debug
        + Send
        + Sync
        + FromPrimitive
        + ToPrimitive
        + PartialOrd
{
}

/// An N-dimensional array of elements.
///
/// # Generics
///
/// - `T`: the element type (must implement [`TensorElem`]).
/// - `RANK`: the number of dimensions (const generic). The full shape is
///   *not* part of the type: batch sizes vary at runtime, so shape
///   mismatches surface as `Err` values rather than type errors.
/// - `D`: the device owning the storage (defaults to [`Cpu`]).
#[derive(Clone)]
pub struct Tensor<T, const RANK: usize, D: Device = Cpu>
where
    T: TensorElem,
{
    shape: [usize; RANK],
    strides: [usize; RANK],
    data: D::Storage<T>,
    device: D,
}

impl<T, const RANK: usize> Tensor<T, RANK, Cpu>
where
    T: TensorElem,
{
    /// Creates a tensor from a flat data vector and a shape.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] if `data.len()` does not equal
    /// the product of `shape`.
    pub fn new(data: Vec<T>, shape: [usize; RANK]) -> Result<Self> {
        let size: usize = shape.iter().product();
        if data.len() != size {
            return Err(TensorError::ShapeMismatch {
                expected: vec![size],
                got: vec![data.len()],
            });
        }

        Ok(Self {
            shape,
            strides: compute_strides(&shape),
            data,
            device: Cpu,
        })
    }

    /// Creates a tensor filled with zeros.
    pub fn zeros(shape: [usize; RANK]) -> Self {
        Self::filled(T::zero(), shape)
    }

    /// Creates a tensor filled with ones.
    pub fn ones(shape: [usize; RANK]) -> Self {
        Self::filled(T::one(), shape)
    }

    /// Creates a tensor with every element set to `value`.
    pub fn filled(value: T, shape: [usize; RANK]) -> Self {
        let size: usize = shape.iter().product();
        Self {
            shape,
            strides: compute_strides(&shape),
            data: vec![value; size],
            device: Cpu,
        }
    }

    /// Reinterprets the tensor under a new shape with the same element count.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] if the element counts differ.
    pub fn reshape<const NEW_RANK: usize>(
        self,
        new_shape: [usize; NEW_RANK],
    ) -> Result<Tensor<T, NEW_RANK, Cpu>> {
        let current: usize = self.shape.iter().product();
        let requested: usize = new_shape.iter().product();
        if current != requested {
            return Err(TensorError::ShapeMismatch {
                expected: vec![current],
                got: vec![requested],
            });
        }

        Ok(Tensor {
            shape: new_shape,
            strides: compute_strides(&new_shape),
            data: self.data,
            device: self.device,
        })
    }
}

impl<T, const RANK: usize, D: Device> Tensor<T, RANK, D>
where
    T: TensorElem,
{
    /// The size of each dimension.
    pub const fn shape(&self) -> &[usize; RANK] {
        &self.shape
    }

    /// Row-major strides: elements to skip per step along each dimension.
    pub const fn strides(&self) -> &[usize; RANK] {
        &self.strides
    }

    /// The underlying data as a flat slice.
    pub fn data(&self) -> &[T] {
        self.data.as_slice()
    }

    /// Mutable access to the underlying data.
    pub fn data_mut(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }

    /// Total number of elements (the product of the shape).
    pub const fn size(&self) -> usize {
        let mut size = 1;
        let mut i = 0;
        while i < RANK {
            size *= self.shape[i];
            i += 1;
        }
        size
    }
}

impl<T, const RANK: usize, D: Device> Debug for Tensor<T, RANK, D>
where
    T: TensorElem,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("device", &self.device.name())
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// Computes row-major strides for a shape.
pub(crate) const fn compute_strides<const RANK: usize>(shape: &[usize; RANK]) -> [usize; RANK] {
    let mut strides = [0; RANK];
    let mut stride = 1;
    let mut i = RANK;
    while i > 0 {
        i -= 1;
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}
