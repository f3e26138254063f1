//! Rank-2 transpose on the CPU.

use crate::{KernelElem, KernelError, Result};

/// Transposes a row-major matrix of shape `[rows, cols]` into `[cols, rows]`.
///
/// # Errors
///
/// Returns `KernelError::ShapeMismatch` if the slice length does not match
/// the shape.
pub fn cpu_transpose<T: KernelElem>(data: &[T], shape: [usize; 2]) -> Result<Vec<T>> {
    let [rows, cols] = shape;

    if data.len() != rows * cols {
        return Err(KernelError::ShapeMismatch {
            expected: vec![rows * cols],
            got: vec![data.len()],
        });
    }

    let mut out = vec![T::zero(); rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = data[r * cols + c];
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose_2x3() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        // [1 2 3]      [1 4]
        // [4 5 6]  ->  [2 5]
        //              [3 6]
        let t = cpu_transpose(&data, [2, 3]).unwrap();
        assert_eq!(t, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_transpose_involution() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let once = cpu_transpose(&data, [4, 2]).unwrap();
        let twice = cpu_transpose(&once, [2, 4]).unwrap();
        assert_eq!(twice, data);
    }

    #[test]
    fn test_transpose_length_mismatch() {
        let data = vec![1.0, 2.0, 3.0];
        let err = cpu_transpose(&data, [2, 2]);
        assert!(matches!(err, Err(KernelError::ShapeMismatch { .. })));
    }
}
