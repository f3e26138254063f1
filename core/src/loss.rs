//! Loss functions and evaluation metrics.

use crate::autograd::Variable;
use crate::tensor::{Cpu, Result, Tensor, TensorElem, TensorError};

/// Mean-squared-error training objective.
///
/// Builds `mean((pred - target)^2)` as a graph operation so that
/// `backward` on the returned scalar flows gradients into the model.
/// Targets enter the graph as constants; no gradient is computed for them.
///
/// # Errors
///
/// Returns [`TensorError::ShapeMismatch`] if the shapes differ.
pub fn mse_loss<T: TensorElem + 'static, const RANK: usize>(
    pred: &Variable<T, RANK>,
    target: &Tensor<T, RANK, Cpu>,
) -> Result<Variable<T, 0>> {
    if pred.data.shape() != target.shape() {
        return Err(TensorError::ShapeMismatch {
            expected: pred.data.shape().to_vec(),
            got: target.shape().to_vec(),
        });
    }

    let diff = pred.clone() - Variable::new(target.clone());
    let squared = diff.clone() * diff;
    Ok(squared.mean())
}

/// Plain mean-squared-error metric over tensors, used by evaluation where
/// no gradients are needed.
///
/// # Errors
///
/// Returns [`TensorError::ShapeMismatch`] if the shapes differ.
pub fn mean_squared_error<T: TensorElem, const RANK: usize>(
    pred: &Tensor<T, RANK, Cpu>,
    target: &Tensor<T, RANK, Cpu>,
) -> Result<T> {
    let diff = (pred - target)?;
    let squared = (&diff * &diff)?;

    let mut sum = T::zero();
    for &v in squared.data() {
        sum += v;
    }
    Ok(sum / T::from_usize(squared.size()).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mse_loss_value() {
        // pred = [1, 3], target = [0, 0]: loss = (1 + 9) / 2 = 5
        let pred = Variable::new(Tensor::new(vec![1.0, 3.0], [2, 1]).unwrap());
        let target = Tensor::new(vec![0.0, 0.0], [2, 1]).unwrap();

        let loss = mse_loss(&pred, &target).unwrap();
        assert_eq!(loss.data.data()[0], 5.0);
    }

    #[test]
    fn test_mse_loss_gradient() {
        // dloss/dpred = 2 (pred - target) / n
        let pred = Variable::new(Tensor::new(vec![1.0, 3.0], [2, 1]).unwrap());
        let target = Tensor::new(vec![0.0, 1.0], [2, 1]).unwrap();

        let loss = mse_loss(&pred, &target).unwrap();
        loss.backward();

        let grad = pred.grad.borrow();
        assert_eq!(grad.as_ref().unwrap().data(), &[1.0, 2.0]);
    }

    #[test]
    fn test_mse_loss_zero_at_perfect_fit() {
        let pred = Variable::new(Tensor::new(vec![2.0, -1.0], [2, 1]).unwrap());
        let target = Tensor::new(vec![2.0, -1.0], [2, 1]).unwrap();

        let loss = mse_loss(&pred, &target).unwrap();
        assert_eq!(loss.data.data()[0], 0.0);
    }

    #[test]
    fn test_mse_loss_shape_mismatch() {
        let pred = Variable::new(Tensor::<f32, 2>::zeros([2, 1]));
        let target = Tensor::<f32, 2>::zeros([3, 1]);
        assert!(mse_loss(&pred, &target).is_err());
    }

    #[test]
    fn test_metric_matches_graph_loss() {
        let pred_t = Tensor::<f32, 2>::new(vec![1.0, 3.0], [2, 1]).unwrap();
        let target = Tensor::<f32, 2>::new(vec![0.0, 1.0], [2, 1]).unwrap();

        let metric = mean_squared_error(&pred_t, &target).unwrap();
        let graph = mse_loss(&Variable::new(pred_t), &target).unwrap();

        assert!((metric - graph.data.data()[0]).abs() < 1e-6);
    }
}
