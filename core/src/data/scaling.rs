//! Column-wise feature scaling.

use crate::tensor::{Result, TensorError};
use rayon::prelude::*;

/// Feature-scaling mode, fitted on the training partition and applied to
/// every partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scaling {
    /// Divide by the per-column maximum absolute value, mapping into `[-1, 1]`.
    MaxAbs,
    /// Map the per-column range onto `[0, 1]`.
    MinMax,
    /// Standardise each column to zero mean and unit variance.
    Std,
}

impl Scaling {
    /// Fits per-column offsets and scales on `rows`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidConfig`] if `rows` is empty.
    pub fn fit(&self, rows: &[Vec<f32>]) -> Result<ColumnScaler> {
        if rows.is_empty() || rows[0].is_empty() {
            return Err(TensorError::InvalidConfig(
                "cannot fit a scaler on empty data".to_string(),
            ));
        }

        let dim = rows[0].len();
        let n = rows.len() as f32;

        let mut offsets = vec![0.0f32; dim];
        let mut scales = vec![1.0f32; dim];

        for c in 0..dim {
            let column = rows.iter().map(|r| r[c]);
            match self {
                Scaling::MaxAbs => {
                    let max_abs = column.fold(0.0f32, |acc, v| acc.max(v.abs()));
                    scales[c] = max_abs;
                }
                Scaling::MinMax => {
                    let (min, max) = column
                        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                            (lo.min(v), hi.max(v))
                        });
                    offsets[c] = min;
                    scales[c] = max - min;
                }
                Scaling::Std => {
                    let mean = column.clone().sum::<f32>() / n;
                    let var = column.map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
                    offsets[c] = mean;
                    scales[c] = var.sqrt();
                }
            }
        }

        // Constant columns pass through unscaled.
        for s in scales.iter_mut() {
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        Ok(ColumnScaler { offsets, scales })
    }
}

/// A fitted column-wise affine transform: `x' = (x - offset) / scale`.
#[derive(Clone, Debug)]
pub struct ColumnScaler {
    offsets: Vec<f32>,
    scales: Vec<f32>,
}

impl ColumnScaler {
    /// Applies the transform to every row in place.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] if a row's width differs
    /// from the fitted width.
    pub fn apply(&self, rows: &mut [Vec<f32>]) -> Result<()> {
        let dim = self.offsets.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != dim) {
            return Err(TensorError::ShapeMismatch {
                expected: vec![dim],
                got: vec![bad.len()],
            });
        }

        rows.par_iter_mut().for_each(|row| {
            for (c, v) in row.iter_mut().enumerate() {
                *v = (*v - self.offsets[c]) / self.scales[c];
            }
        });

        Ok(())
    }
}
