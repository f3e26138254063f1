use drugresp::data::{LoaderConfig, Partition, ResponseLoader, Scaling};
use drugresp::distributed::MirroredStrategy;
use drugresp::estimator::{
    train_and_evaluate, Estimator, EstimatorModel, EstimatorResult, EvalSpec, Mode, RunConfig,
    TrainSpec,
};
use drugresp::nn::{Activation, Dense};
use drugresp::optim::Sgd;
use drugresp::tensor::{Cpu, Result, Tensor, TensorError};
use drugresp::Variable;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

const BATCH_SIZE: usize = 16;

/// A small two-layer bias-free regression net for test runs.
struct TinyNet {
    layers: Vec<Dense<f32>>,
}

const LAYER_NAMES: [&str; 2] = ["dense_1", "dense_2"];

impl TinyNet {
    fn new(input_dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            layers: vec![
                Dense::new(input_dim, 8, Activation::Relu, &mut rng),
                Dense::new(8, 1, Activation::Linear, &mut rng),
            ],
        }
    }
}

impl EstimatorModel for TinyNet {
    fn forward(&self, features: &Tensor<f32, 2, Cpu>) -> Result<Variable<f32, 2>> {
        let mut hidden = Variable::new(features.clone());
        for layer in &self.layers {
            hidden = layer.forward(&hidden)?;
        }
        Ok(hidden)
    }

    fn params(&mut self) -> Vec<&mut Variable<f32, 2>> {
        self.layers.iter_mut().map(|l| &mut l.weight).collect()
    }

    fn weights(&self) -> Vec<(String, Tensor<f32, 2, Cpu>)> {
        self.layers
            .iter()
            .zip(LAYER_NAMES)
            .map(|(l, name)| (name.to_string(), l.weight.data.clone()))
            .collect()
    }

    fn from_weights(weights: Vec<(String, Tensor<f32, 2, Cpu>)>) -> Result<Self> {
        let mut layers = Vec::new();
        for (i, name) in LAYER_NAMES.iter().enumerate() {
            let (_, weight) = weights
                .iter()
                .find(|(n, _)| n == name)
                .ok_or_else(|| TensorError::Checkpoint(format!("missing weight '{}'", name)))?;
            let activation = if i + 1 == LAYER_NAMES.len() {
                Activation::Linear
            } else {
                Activation::Relu
            };
            layers.push(Dense::from_weight(weight.clone(), activation));
        }
        Ok(Self { layers })
    }
}

fn test_loader() -> ResponseLoader {
    ResponseLoader::new(LoaderConfig {
        samples: 240,
        input_dim: 4,
        scaling: Some(Scaling::Std),
        seed: 7,
        ..LoaderConfig::default()
    })
    .unwrap()
}

fn test_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("drugresp-it-{}-{}", tag, std::process::id()));
    std::fs::remove_dir_all(&dir).ok();
    dir
}

#[test]
fn test_train_and_evaluate_improves_validation_loss() {
    let loader = test_loader();
    let dir = test_dir("improves");

    let mut estimator = Estimator::new(
        TinyNet::new(loader.input_dim(), 3),
        Sgd::new(0.05),
        RunConfig::new(&dir).log_every_n_steps(0),
    )
    .unwrap();

    let eval_steps = loader.steps_per_epoch(Partition::Val, BATCH_SIZE).max(1);
    let before = estimator
        .evaluate(|| loader.flow(Partition::Val, BATCH_SIZE), eval_steps)
        .unwrap();

    let metrics = train_and_evaluate(
        &mut estimator,
        TrainSpec {
            input_fn: || loader.flow(Partition::Train, BATCH_SIZE),
            max_steps: 100,
        },
        EvalSpec {
            input_fn: || loader.flow(Partition::Val, BATCH_SIZE),
            steps: eval_steps,
        },
    )
    .unwrap();

    std::fs::remove_dir_all(&dir).ok();

    assert_eq!(estimator.global_step(), 100);
    assert!(
        metrics.loss < before.loss,
        "validation loss did not improve: {} -> {}",
        before.loss,
        metrics.loss
    );
}

#[test]
fn test_mirrored_training_matches_local() {
    let loader = test_loader();
    let steps = 20;

    // Local run.
    let local_dir = test_dir("local");
    let mut local = Estimator::new(
        TinyNet::new(loader.input_dim(), 11),
        Sgd::new(0.05),
        RunConfig::new(&local_dir).log_every_n_steps(0),
    )
    .unwrap();
    local
        .train(|| loader.flow(Partition::Train, BATCH_SIZE), steps)
        .unwrap();

    // Mirrored run from identical initial weights over the same stream.
    let mirrored_dir = test_dir("mirrored");
    let strategy = MirroredStrategy::new(["cpu:0", "cpu:1"]).unwrap();
    let mut mirrored = Estimator::new(
        TinyNet::new(loader.input_dim(), 11),
        Sgd::new(0.05),
        RunConfig::new(&mirrored_dir)
            .train_distribute(strategy)
            .log_every_n_steps(0),
    )
    .unwrap();
    mirrored
        .train(|| loader.flow(Partition::Train, BATCH_SIZE), steps)
        .unwrap();

    std::fs::remove_dir_all(&local_dir).ok();
    std::fs::remove_dir_all(&mirrored_dir).ok();

    // Averaging per-shard gradients reproduces the full-batch gradient,
    // so both runs land on the same weights up to float reassociation.
    for ((name_a, a), (name_b, b)) in local
        .model()
        .weights()
        .iter()
        .zip(mirrored.model().weights().iter())
    {
        assert_eq!(name_a, name_b);
        for (va, vb) in a.data().iter().zip(b.data().iter()) {
            assert!(
                (va - vb).abs() < 1e-4,
                "weights diverged in {}: {} vs {}",
                name_a,
                va,
                vb
            );
        }
    }
}

#[test]
fn test_mirrored_rejects_indivisible_batch() {
    let loader = ResponseLoader::new(LoaderConfig {
        samples: 240,
        input_dim: 4,
        seed: 7,
        ..LoaderConfig::default()
    })
    .unwrap();
    let dir = test_dir("indivisible");

    let strategy = MirroredStrategy::new(["cpu:0", "cpu:1", "cpu:2"]).unwrap();
    let mut estimator = Estimator::new(
        TinyNet::new(loader.input_dim(), 5),
        Sgd::new(0.05),
        RunConfig::new(&dir)
            .train_distribute(strategy)
            .log_every_n_steps(0),
    )
    .unwrap();

    // 16 does not divide across 3 replicas.
    let err = estimator.train(|| loader.flow(Partition::Train, 16), 1);
    std::fs::remove_dir_all(&dir).ok();
    assert!(matches!(err, Err(TensorError::InvalidConfig(_))));
}

#[test]
fn test_predict_returns_one_value_per_example() {
    let loader = test_loader();
    let dir = test_dir("predict");

    let mut estimator = Estimator::new(
        TinyNet::new(loader.input_dim(), 3),
        Sgd::new(0.05),
        RunConfig::new(&dir).log_every_n_steps(0),
    )
    .unwrap();

    let result = estimator
        .run(Mode::Predict, || loader.flow(Partition::Test, BATCH_SIZE), 2)
        .unwrap();
    std::fs::remove_dir_all(&dir).ok();

    match result {
        EstimatorResult::Predictions(preds) => assert_eq!(preds.len(), 2 * BATCH_SIZE),
        other => panic!("expected predictions, got {:?}", other),
    }
}
