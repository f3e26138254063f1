use drugresp::data::Batch;
use drugresp::estimator::{Estimator, EstimatorModel, RunConfig};
use drugresp::nn::{Activation, Dense};
use drugresp::optim::Sgd;
use drugresp::tensor::{Cpu, Result, Tensor, TensorError};
use drugresp::Variable;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

/// Single bias-free projection 3 -> 1.
struct Probe {
    layer: Dense<f32>,
}

impl Probe {
    fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            layer: Dense::new(3, 1, Activation::Linear, &mut rng),
        }
    }
}

impl EstimatorModel for Probe {
    fn forward(&self, features: &Tensor<f32, 2, Cpu>) -> Result<Variable<f32, 2>> {
        self.layer.forward(&Variable::new(features.clone()))
    }

    fn params(&mut self) -> Vec<&mut Variable<f32, 2>> {
        vec![&mut self.layer.weight]
    }

    fn weights(&self) -> Vec<(String, Tensor<f32, 2, Cpu>)> {
        vec![("probe".to_string(), self.layer.weight.data.clone())]
    }

    fn from_weights(weights: Vec<(String, Tensor<f32, 2, Cpu>)>) -> Result<Self> {
        let (_, weight) = weights
            .into_iter()
            .find(|(name, _)| name == "probe")
            .ok_or_else(|| TensorError::Checkpoint("missing 'probe' weight".to_string()))?;
        Ok(Self {
            layer: Dense::from_weight(weight, Activation::Linear),
        })
    }
}

fn batches() -> impl Iterator<Item = Batch> {
    // y = x0 + 2 x1 - x2
    std::iter::repeat_with(|| Batch {
        features: Tensor::new(
            vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0],
            [4, 3],
        )
        .unwrap(),
        labels: Tensor::new(vec![1.0, 2.0, -1.0, 2.0], [4]).unwrap(),
    })
}

fn test_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("drugresp-ckpt-it-{}-{}", tag, std::process::id()));
    std::fs::remove_dir_all(&dir).ok();
    dir
}

#[test]
fn test_estimator_restores_trained_weights() {
    let dir = test_dir("restore");

    // Train and let the estimator checkpoint into the model dir.
    let mut first = Estimator::new(
        Probe::new(1),
        Sgd::new(0.1),
        RunConfig::new(&dir).log_every_n_steps(0),
    )
    .unwrap();
    first.train(batches, 200).unwrap();
    let trained = first.model().weights();

    // A second estimator over the same dir must come up with the trained
    // weights, regardless of its own model's initialisation.
    let second = Estimator::new(
        Probe::new(999),
        Sgd::new(0.1),
        RunConfig::new(&dir).log_every_n_steps(0),
    )
    .unwrap();
    let restored = second.model().weights();

    std::fs::remove_dir_all(&dir).ok();

    assert_eq!(trained.len(), restored.len());
    for ((na, a), (nb, b)) in trained.iter().zip(restored.iter()) {
        assert_eq!(na, nb);
        assert_eq!(a.shape(), b.shape());
        assert_eq!(a.data(), b.data());
    }

    // 200 steps on a noiseless linear target should be close to exact.
    let w = &trained[0].1;
    let expected = [1.0, 2.0, -1.0];
    for (v, e) in w.data().iter().zip(expected) {
        assert!((v - e).abs() < 1e-2, "weight {} vs expected {}", v, e);
    }
}

#[test]
fn test_fresh_dir_keeps_initial_weights() {
    let dir = test_dir("fresh");

    let model = Probe::new(42);
    let initial = model.weights();

    let estimator = Estimator::new(
        model,
        Sgd::new(0.1),
        RunConfig::new(&dir).log_every_n_steps(0),
    )
    .unwrap();

    std::fs::remove_dir_all(&dir).ok();

    assert_eq!(estimator.model().weights()[0].1.data(), initial[0].1.data());
}
