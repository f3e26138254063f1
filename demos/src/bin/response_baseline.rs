//! Fully-connected drug-response regression baseline.
//!
//! Trains a five-layer bias-free MLP on drug-response data through the
//! estimator API, replicated across four logical devices with the
//! mirrored data-parallel strategy. Behaviour is controlled by the
//! constants below; there are no flags.

use drugresp::data::{LoaderConfig, Partition, ResponseLoader, Scaling};
use drugresp::distributed::{available_devices, MirroredStrategy};
use drugresp::estimator::{
    train_and_evaluate, Estimator, EstimatorModel, EvalSpec, RunConfig, TrainSpec,
};
use drugresp::nn::{Activation, Dense};
use drugresp::optim::Sgd;
use drugresp::tensor::{Cpu, Result, Tensor, TensorError};
use drugresp::Variable;
use rand::rngs::StdRng;
use rand::SeedableRng;

// Model and training parameters
const SEED: u64 = 2016;
const BATCH_SIZE: usize = 100;
const EPOCHS: usize = 20;
const LEARNING_RATE: f32 = 0.01;
const OUT_DIR: &str = "/tmp/fc_regression_model";
const LOG_EVERY_N_STEPS: usize = 10;

// Hidden units per layer.
const D1: usize = 6000;
const D2: usize = 500;
const D3: usize = 100;
const D4: usize = 50;
const OUTPUT_DIM: usize = 1;
// Total parameters = (INPUT_DIM * D1) + (D1 * D2) +
//                    (D2 * D3) + (D3 * D4) + (D4 * OUTPUT_DIM)
const INPUT_DIM: usize = 29532;

// Synthetic source configuration (the real pipeline reads these from an
// external loader; splits and dose window match it).
const SAMPLES: usize = 2000;
const VAL_SPLIT: f32 = 0.2;
const TEST_CELL_SPLIT: f32 = 0.15;
const MIN_LOGCONC: f32 = -5.0;
const MAX_LOGCONC: f32 = -4.0;
// Feature scaling: MaxAbs to [-1,1], MinMax to [0,1], Std to standard normal.
const SCALING: Option<Scaling> = Some(Scaling::Std);
// Number of features to randomly sample; 0 keeps all of them.
const FEATURE_SUBSAMPLE: usize = 0;

const DEVICES: [&str; 4] = ["cpu:0", "cpu:1", "cpu:2", "cpu:3"];

/// The regression network: five dense projections, ReLU on every layer
/// except the last, no biases anywhere.
struct ResponseNet {
    layers: Vec<Dense<f32>>,
}

const LAYER_NAMES: [&str; 5] = ["dense_1", "dense_2", "dense_3", "dense_4", "dense_5"];

impl ResponseNet {
    fn new(input_dim: usize, rng: &mut StdRng) -> Self {
        let widths = [input_dim, D1, D2, D3, D4, OUTPUT_DIM];
        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(i, w)| Dense::new(w[0], w[1], activation_for(i), rng))
            .collect();
        Self { layers }
    }
}

fn activation_for(layer_index: usize) -> Activation {
    if layer_index + 1 == LAYER_NAMES.len() {
        Activation::Linear
    } else {
        Activation::Relu
    }
}

impl EstimatorModel for ResponseNet {
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
        let mut layers = Vec::with_capacity(LAYER_NAMES.len());
        for (i, name) in LAYER_NAMES.iter().enumerate() {
            let (_, weight) = weights
                .iter()
                .find(|(n, _)| n == name)
                .ok_or_else(|| TensorError::Checkpoint(format!("missing weight '{}'", name)))?;
            layers.push(Dense::from_weight(weight.clone(), activation_for(i)));
        }
        Ok(Self { layers })
    }

    fn param_count(&self) -> usize {
        self.layers.iter().map(|l| l.weight.data.size()).sum()
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    )
    .init();

    log::info!("available devices: {:?}", available_devices());

    let loader = ResponseLoader::new(LoaderConfig {
        samples: SAMPLES,
        input_dim: INPUT_DIM,
        val_split: VAL_SPLIT,
        test_split: TEST_CELL_SPLIT,
        feature_subsample: FEATURE_SUBSAMPLE,
        scaling: SCALING,
        min_logconc: MIN_LOGCONC,
        max_logconc: MAX_LOGCONC,
        seed: SEED,
    })?;
    log::info!("loader input dim: {}", loader.input_dim());

    let strategy = MirroredStrategy::new(DEVICES)?;
    let config = RunConfig::new(OUT_DIR)
        .train_distribute(strategy)
        .log_every_n_steps(LOG_EVERY_N_STEPS);

    let mut rng = StdRng::seed_from_u64(SEED);
    let model = ResponseNet::new(loader.input_dim(), &mut rng);
    let mut regressor = Estimator::new(model, Sgd::new(LEARNING_RATE), config)?;

    let train_steps = loader.steps_per_epoch(Partition::Train, BATCH_SIZE) * EPOCHS;
    let eval_steps = loader.steps_per_epoch(Partition::Val, BATCH_SIZE).max(1);

    train_and_evaluate(
        &mut regressor,
        TrainSpec {
            input_fn: || loader.flow(Partition::Train, BATCH_SIZE),
            max_steps: train_steps,
        },
        EvalSpec {
            input_fn: || loader.flow(Partition::Val, BATCH_SIZE),
            steps: eval_steps,
        },
    )?;

    let test_steps = loader.steps_per_epoch(Partition::Test, BATCH_SIZE).max(1);
    let test_metrics = regressor.evaluate(|| loader.flow(Partition::Test, BATCH_SIZE), test_steps)?;
    log::info!("test mse: {:.6}", test_metrics.mse);

    let predictions = regressor.predict(|| loader.flow(Partition::Test, BATCH_SIZE), 1)?;
    let shown = predictions.len().min(8);
    log::info!("first test predictions: {:?}", &predictions[..shown]);

    Ok(())
}
