//! Tensor operations.
//!
//! Element-wise arithmetic (`+ - * /` on `&Tensor`, strict shape equality),
//! `map`/`scale`, rank-2 matrix multiplication (delegated to the kernels
//! crate), and rank-2 transpose (delegated through the [`Device`] seam).
//! Element-wise loops are parallelised with rayon, which pays off at the
//! feature widths this stack batches (tens of thousands of columns).

use super::{compute_strides, Cpu, Device, Result, Tensor, TensorElem, TensorError};

use rayon::prelude::*;
use std::ops::{Add, Div, Mul, Sub};

/// Implements a binary arithmetic trait for `&Tensor`: shape check, output
/// allocation, parallel element-wise apply.
macro_rules! impl_bin_op {
    ($trait:ident, $method:ident) => {
        impl<T, const RANK: usize> $trait for &Tensor<T, RANK, Cpu>
        where
            T: TensorElem,
        {
            type Output = Result<Tensor<T, RANK, Cpu>>;

            fn $method(self, rhs: Self) -> Self::Output {
                if self.shape != rhs.shape {
                    return Err(TensorError::ShapeMismatch {
                        expected: self.shape.to_vec(),
                        got: rhs.shape.to_vec(),
                    });
                }

                let mut out = Tensor::zeros(self.shape);
                out.data
                    .par_iter_mut()
                    .zip(self.data.par_iter())
                    .zip(rhs.data.par_iter())
                    .for_each(|((o, a), b)| {
                        *o = a.$method(*b);
                    });

                Ok(out)
            }
        }
    };
}

impl_bin_op!(Add, add);
impl_bin_op!(Sub, sub);
impl_bin_op!(Mul, mul);
impl_bin_op!(Div, div);

impl<T, const RANK: usize> Tensor<T, RANK, Cpu>
where
    T: TensorElem,
{
    /// Applies `f` element-wise, producing a new tensor of the same shape.
    ///
    /// ```rust
    /// use drugresp::tensor::Tensor;
    /// let t = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
    /// let doubled = t.map(|x| x * 2.0);
    /// assert_eq!(doubled.data(), &[2.0, 4.0, 6.0]);
    /// ```
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T + Sync + Send,
    {
        let mut out = Tensor::zeros(self.shape);
        out.data
            .par_iter_mut()
            .zip(self.data.par_iter())
            .for_each(|(o, i)| *o = f(*i));
        out
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&self, factor: T) -> Self {
        self.map(move |x| x * factor)
    }
}

impl<T> Tensor<T, 2, Cpu>
where
    T: TensorElem,
{
    /// Matrix multiplication: `[M, K] x [K, N] -> [M, N]`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] if the inner dimensions
    /// disagree.
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        let out_shape = [self.shape[0], rhs.shape[1]];

        let out_data =
            drugresp_kernels::cpu_matmul(self.data(), rhs.data(), self.shape, rhs.shape).map_err(
                |e| match e {
                    drugresp_kernels::KernelError::ShapeMismatch { expected, got } => {
                        TensorError::ShapeMismatch { expected, got }
                    }
                },
            )?;

        Ok(Tensor {
            shape: out_shape,
            strides: compute_strides(&out_shape),
            data: out_data,
            device: Cpu,
        })
    }
}

impl<T, D> Tensor<T, 2, D>
where
    T: TensorElem,
    D: Device,
{
    /// Transposes the matrix: `[M, N] -> [N, M]`.
    pub fn transpose(&self) -> Result<Tensor<T, 2, D>> {
        let out_data = D::transpose(&self.data, &self.shape)?;
        let new_shape = [self.shape[1], self.shape[0]];

        Ok(Tensor {
            shape: new_shape,
            strides: compute_strides(&new_shape),
            data: out_data,
            device: self.device.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
        let b = Tensor::<f32, 1>::new(vec![3.0, 4.0], [2]).unwrap();

        assert_eq!((&a + &b).unwrap().data(), &[4.0, 6.0]);
        assert_eq!((&a - &b).unwrap().data(), &[-2.0, -2.0]);
        assert_eq!((&a * &b).unwrap().data(), &[3.0, 8.0]);
        assert_eq!((&a / &b).unwrap().data(), &[1.0 / 3.0, 0.5]);
    }

    #[test]
    fn test_arithmetic_shape_mismatch() {
        let a = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
        let b = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();

        assert!(matches!(&a + &b, Err(TensorError::ShapeMismatch { .. })));
        assert!(matches!(&a - &b, Err(TensorError::ShapeMismatch { .. })));
        assert!(matches!(&a * &b, Err(TensorError::ShapeMismatch { .. })));
        assert!(matches!(&a / &b, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_map_and_scale() {
        let a = Tensor::<f32, 1>::new(vec![1.0, -2.0, 3.0], [3]).unwrap();
        assert_eq!(a.map(|x| x.abs()).data(), &[1.0, 2.0, 3.0]);
        assert_eq!(a.scale(2.0).data(), &[2.0, -4.0, 6.0]);
    }

    #[test]
    fn test_matmul() {
        let a = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
        let b = Tensor::<f32, 2>::new(vec![7.0, 8.0, 9.0, 1.0, 2.0, 3.0], [3, 2]).unwrap();

        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        // Row 0: 1*7 + 2*9 + 3*2 = 31, 1*8 + 2*1 + 3*3 = 19
        // Row 1: 4*7 + 5*9 + 6*2 = 85, 4*8 + 5*1 + 6*3 = 55
        assert_eq!(c.data(), &[31.0, 19.0, 85.0, 55.0]);
    }

    #[test]
    fn test_matmul_mismatch() {
        let a = Tensor::<f32, 2>::zeros([2, 3]);
        let b = Tensor::<f32, 2>::zeros([4, 2]);

        let err = a.matmul(&b);
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_transpose() {
        let t = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();

        let tt = t.transpose().unwrap();
        assert_eq!(tt.shape(), &[3, 2]);
        assert_eq!(tt.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }
}
