//! The trainable fully-connected layer.

use crate::autograd::Variable;
use crate::nn::Activation;
use crate::tensor::{Cpu, Result, Tensor, TensorElem};
use rand::Rng;

/// A dense (fully-connected) layer without a bias term.
///
/// The layer computes `y = act(x @ W)` with `W` of shape
/// `[in_features, out_features]`. The regression models this stack trains
/// are bias-free throughout, so the layer carries no bias parameter.
#[derive(Debug)]
pub struct Dense<T: TensorElem> {
    /// Learnable weight matrix, shape `[in_features, out_features]`.
    pub weight: Variable<T, 2>,
    /// Activation applied after the projection.
    pub activation: Activation,
}

impl<T: TensorElem + 'static> Dense<T> {
    /// Creates a layer with Xavier-uniform initialised weights drawn from
    /// the caller's RNG, so a seeded RNG yields a reproducible model.
    pub fn new<R: Rng>(
        in_features: usize,
        out_features: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let scale = (6.0 / (in_features + out_features) as f64).sqrt();
        let data: Vec<T> = (0..in_features * out_features)
            .map(|_| T::from_f64(rng.random_range(-scale..scale)).unwrap())
            .collect();

        // Length matches the shape product by construction.
        let weight = Tensor::new(data, [in_features, out_features]).unwrap();
        Self {
            weight: Variable::new(weight),
            activation,
        }
    }

    /// Wraps an existing weight matrix, e.g. one restored from a
    /// checkpoint.
    pub fn from_weight(weight: Tensor<T, 2, Cpu>, activation: Activation) -> Self {
        Self {
            weight: Variable::new(weight),
            activation,
        }
    }

    /// Input width.
    pub fn in_features(&self) -> usize {
        self.weight.data.shape()[0]
    }

    /// Output width.
    pub fn out_features(&self) -> usize {
        self.weight.data.shape()[1]
    }

    /// Forward pass: `act(x @ W)` for `x` of shape `[batch, in_features]`.
    ///
    /// # Errors
    ///
    /// Returns a shape error if `x`'s column count does not match
    /// `in_features`.
    pub fn forward(&self, x: &Variable<T, 2>) -> Result<Variable<T, 2>> {
        let projected = x.matmul(&self.weight)?;
        Ok(self.activation.apply(projected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_dense_shapes() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Dense::<f32>::new(4, 3, Activation::Relu, &mut rng);

        assert_eq!(layer.in_features(), 4);
        assert_eq!(layer.out_features(), 3);
        assert_eq!(layer.weight.data.shape(), &[4, 3]);
    }

    #[test]
    fn test_dense_init_is_seeded() {
        let a = Dense::<f32>::new(4, 3, Activation::Relu, &mut StdRng::seed_from_u64(7));
        let b = Dense::<f32>::new(4, 3, Activation::Relu, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.weight.data.data(), b.weight.data.data());
    }

    #[test]
    fn test_dense_init_within_xavier_bound() {
        let layer = Dense::<f32>::new(10, 5, Activation::Relu, &mut StdRng::seed_from_u64(7));
        let bound = (6.0f32 / 15.0).sqrt();
        assert!(layer
            .weight
            .data
            .data()
            .iter()
            .all(|w| w.abs() < bound + 1e-6));
    }

    #[test]
    fn test_forward_identity_weight() {
        let weight = Tensor::new(vec![1.0, 0.0, 0.0, 1.0], [2, 2]).unwrap();
        let layer = Dense::from_weight(weight, Activation::Linear);

        let x = Variable::new(Tensor::new(vec![3.0, -4.0], [1, 2]).unwrap());
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.data.data(), &[3.0, -4.0]);
    }

    #[test]
    fn test_forward_applies_relu() {
        let weight = Tensor::new(vec![1.0, 0.0, 0.0, 1.0], [2, 2]).unwrap();
        let layer = Dense::from_weight(weight, Activation::Relu);

        let x = Variable::new(Tensor::new(vec![3.0, -4.0], [1, 2]).unwrap());
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.data.data(), &[3.0, 0.0]);
    }

    #[test]
    fn test_forward_shape_mismatch() {
        let layer = Dense::<f32>::new(4, 3, Activation::Relu, &mut StdRng::seed_from_u64(7));
        let x = Variable::new(Tensor::<f32, 2>::zeros([1, 5]));
        assert!(layer.forward(&x).is_err());
    }

    #[test]
    fn test_backward_reaches_weight() {
        let weight = Tensor::new(vec![1.0, 2.0], [2, 1]).unwrap();
        let layer = Dense::from_weight(weight, Activation::Linear);

        let x = Variable::new(Tensor::new(vec![3.0, 4.0], [1, 2]).unwrap());
        let y = layer.forward(&x).unwrap();
        y.backward();

        // dW = x^T @ g = [[3], [4]]
        let grad = layer.weight.grad.borrow();
        assert_eq!(grad.as_ref().unwrap().data(), &[3.0, 4.0]);
    }
}
