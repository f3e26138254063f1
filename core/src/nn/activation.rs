//! Activations applied by [`Dense`](super::Dense) after its projection.

use crate::autograd::Variable;
use crate::tensor::TensorElem;

/// The activation fused onto a dense layer's output.
///
/// `Relu` is used on every hidden layer of the regression network;
/// `Linear` (identity) on the output layer, which regresses an unbounded
/// response value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Linear,
}

impl Activation {
    /// Applies the activation as a graph operation.
    pub fn apply<T: TensorElem + 'static, const RANK: usize>(
        &self,
        x: Variable<T, RANK>,
    ) -> Variable<T, RANK> {
        match self {
            Activation::Relu => x.relu(),
            Activation::Linear => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    #[test]
    fn test_relu_clamps_negatives() {
        let x = Variable::new(Tensor::new(vec![-2.0, 0.5], [2]).unwrap());
        let y = Activation::Relu.apply(x);
        assert_eq!(y.data.data(), &[0.0, 0.5]);
    }

    #[test]
    fn test_linear_is_identity() {
        let x = Variable::new(Tensor::new(vec![-2.0, 0.5], [2]).unwrap());
        let y = Activation::Linear.apply(x.clone());
        assert_eq!(y.data.data(), x.data.data());
        // Identity adds no graph node.
        assert!(y.node.is_none());
    }
}
