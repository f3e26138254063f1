//! Rank-2 matrix multiplication on the CPU.

use crate::{KernelElem, KernelError, Result};
use rayon::prelude::*;

/// Multiplies two row-major matrices: `[M, K] x [K, N] -> [M, N]`.
///
/// Output rows are computed in parallel with rayon. The inner loops run in
/// `i-k-j` order so the right-hand matrix is streamed row by row, which
/// keeps the access pattern cache-friendly for the wide feature matrices
/// this stack multiplies.
///
/// # Errors
///
/// Returns `KernelError::ShapeMismatch` if the slice lengths do not match
/// their shapes or the inner dimensions disagree.
pub fn cpu_matmul<T: KernelElem>(
    a: &[T],
    b: &[T],
    a_shape: [usize; 2],
    b_shape: [usize; 2],
) -> Result<Vec<T>> {
    let [m, k] = a_shape;
    let [k2, n] = b_shape;

    if k != k2 {
        return Err(KernelError::ShapeMismatch {
            expected: a_shape.to_vec(),
            got: b_shape.to_vec(),
        });
    }
    if a.len() != m * k {
        return Err(KernelError::ShapeMismatch {
            expected: vec![m * k],
            got: vec![a.len()],
        });
    }
    if b.len() != k * n {
        return Err(KernelError::ShapeMismatch {
            expected: vec![k * n],
            got: vec![b.len()],
        });
    }

    let mut out = vec![T::zero(); m * n];

    out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        for kk in 0..k {
            let a_ik = a[i * k + kk];
            let b_row = &b[kk * n..(kk + 1) * n];
            for (o, &b_kj) in row.iter_mut().zip(b_row.iter()) {
                *o += a_ik * b_kj;
            }
        }
    });

    Ok(out)
}
