//! High-level training orchestration: the estimator.
//!
//! An [`Estimator`] owns a model, an optimiser, and a [`RunConfig`], and
//! drives the three execution modes (train, evaluate, predict) against
//! input functions. An input function is a factory returning a fresh
//! batch iterator; it is called once per run on a single device, and once
//! per replica under a mirrored strategy, where the deterministic streams
//! guarantee every replica sees the same batches and takes its own shard.
//!
//! Training checkpoints the model into the configured model directory;
//! constructing an estimator over a directory that already holds a
//! checkpoint restores those weights.

use crate::autograd::Variable;
use crate::checkpoint;
use crate::data::Batch;
use crate::distributed::{all_reduce_mean, CollectiveBackend, CpuBackend, MirroredStrategy};
use crate::loss::{mean_squared_error, mse_loss};
use crate::optim::{Optimizer, Sgd};
use crate::tensor::{Cpu, Result, Tensor, TensorError};
use std::path::{Path, PathBuf};

/// The three execution modes an estimator dispatches between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Predict,
    Train,
    Evaluate,
}

/// The mode-specific result of [`Estimator::run`].
#[derive(Clone, Debug)]
pub enum EstimatorResult {
    /// Training ran to its step budget; carries the last step's loss.
    Trained { final_loss: f32 },
    /// Evaluation metrics over the requested steps.
    Evaluation(EvalMetrics),
    /// Flattened regression outputs, one value per example.
    Predictions(Vec<f32>),
}

/// Aggregated evaluation results.
#[derive(Clone, Copy, Debug)]
pub struct EvalMetrics {
    /// Mean objective value over the evaluated batches.
    pub loss: f32,
    /// Mean-squared-error metric (identical to `loss` for this objective,
    /// reported separately as evaluation surfaces usually do).
    pub mse: f32,
    /// Number of batches evaluated.
    pub steps: usize,
}

/// The model seam the estimator trains through.
///
/// Implementations own their layers; the estimator only needs a forward
/// pass, mutable access to the parameters for updates, and a plain-tensor
/// snapshot/restore pair. The snapshot form is what crosses replica
/// threads and what checkpoints persist; `Variable` graphs themselves
/// never leave their thread.
pub trait EstimatorModel: Sized {
    /// Graph-building forward pass over a feature batch
    /// `[batch, features]`, returning predictions `[batch, 1]`.
    fn forward(&self, features: &Tensor<f32, 2, Cpu>) -> Result<Variable<f32, 2>>;

    /// Mutable references to every trainable parameter, in a stable order.
    fn params(&mut self) -> Vec<&mut Variable<f32, 2>>;

    /// Named copies of every parameter, in the same stable order.
    fn weights(&self) -> Vec<(String, Tensor<f32, 2, Cpu>)>;

    /// Rebuilds the model from named weights (as produced by [`weights`]
    /// or a checkpoint; order may differ, names are authoritative).
    ///
    /// [`weights`]: EstimatorModel::weights
    fn from_weights(weights: Vec<(String, Tensor<f32, 2, Cpu>)>) -> Result<Self>;

    /// Total number of trainable scalars.
    fn param_count(&self) -> usize {
        self.weights().iter().map(|(_, t)| t.size()).sum()
    }
}

/// Estimator run configuration.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Directory receiving checkpoints (created on first save).
    pub model_dir: PathBuf,
    /// When set, `train` replicates across the strategy's devices.
    pub train_distribute: Option<MirroredStrategy>,
    /// Step-loss logging cadence; 0 silences step logs.
    pub log_every_n_steps: usize,
}

impl RunConfig {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            train_distribute: None,
            log_every_n_steps: 100,
        }
    }

    /// Trains under the given mirrored strategy.
    pub fn train_distribute(mut self, strategy: MirroredStrategy) -> Self {
        self.train_distribute = Some(strategy);
        self
    }

    /// Changes the step-loss logging cadence.
    pub fn log_every_n_steps(mut self, n: usize) -> Self {
        self.log_every_n_steps = n;
        self
    }
}

/// Training side of [`train_and_evaluate`].
pub struct TrainSpec<F> {
    pub input_fn: F,
    pub max_steps: usize,
}

/// Evaluation side of [`train_and_evaluate`].
pub struct EvalSpec<F> {
    pub input_fn: F,
    pub steps: usize,
}

/// Owns a model and drives its training, evaluation, and prediction.
pub struct Estimator<M: EstimatorModel> {
    model: M,
    optimizer: Sgd<f32>,
    config: RunConfig,
    global_step: usize,
}

impl<M: EstimatorModel> Estimator<M> {
    /// Creates an estimator, restoring weights from the model directory's
    /// checkpoint when one exists.
    pub fn new(model: M, optimizer: Sgd<f32>, config: RunConfig) -> Result<Self> {
        let mut model = model;

        let ckpt = checkpoint_path(&config.model_dir);
        if ckpt.exists() {
            model = M::from_weights(checkpoint::load_checkpoint(&ckpt)?)?;
            log::info!("restored parameters from {}", ckpt.display());
        }

        log::info!("total parameter count: {}", model.param_count());

        Ok(Self {
            model,
            optimizer,
            config,
            global_step: 0,
        })
    }

    /// The current model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Steps trained so far by this estimator instance.
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// Dispatches one of the three execution modes over the same input
    /// function, returning the mode's result object.
    pub fn run<F, I>(&mut self, mode: Mode, input_fn: F, steps: usize) -> Result<EstimatorResult>
    where
        F: Fn() -> I + Sync,
        I: Iterator<Item = Batch>,
    {
        match mode {
            Mode::Train => Ok(EstimatorResult::Trained {
                final_loss: self.train(input_fn, steps)?,
            }),
            Mode::Evaluate => Ok(EstimatorResult::Evaluation(self.evaluate(input_fn, steps)?)),
            Mode::Predict => Ok(EstimatorResult::Predictions(self.predict(input_fn, steps)?)),
        }
    }

    /// Trains for `max_steps` batches and checkpoints the result.
    ///
    /// Runs on the local device, or replicated across the configured
    /// mirrored strategy when the run config carries one. Returns the
    /// last step's loss.
    pub fn train<F, I>(&mut self, input_fn: F, max_steps: usize) -> Result<f32>
    where
        F: Fn() -> I + Sync,
        I: Iterator<Item = Batch>,
    {
        let final_loss = match self.config.train_distribute.clone() {
            Some(strategy) if strategy.num_replicas() > 1 => {
                self.train_mirrored(&strategy, &input_fn, max_steps)?
            }
            _ => self.train_local(&input_fn, max_steps)?,
        };

        self.save()?;
        Ok(final_loss)
    }

    fn train_local<F, I>(&mut self, input_fn: &F, max_steps: usize) -> Result<f32>
    where
        F: Fn() -> I,
        I: Iterator<Item = Batch>,
    {
        let mut stream = input_fn();
        let mut last = 0.0;

        for _ in 0..max_steps {
            let batch = next_batch(&mut stream)?;
            last = train_step(&mut self.model, &self.optimizer, &batch, None)?;
            self.global_step += 1;

            if self.config.log_every_n_steps > 0
                && self.global_step % self.config.log_every_n_steps == 0
            {
                log::info!("step {}: loss = {:.6}", self.global_step, last);
            }
        }

        Ok(last)
    }

    fn train_mirrored<F, I>(
        &mut self,
        strategy: &MirroredStrategy,
        input_fn: &F,
        max_steps: usize,
    ) -> Result<f32>
    where
        F: Fn() -> I + Sync,
        I: Iterator<Item = Batch>,
    {
        type Snapshot = Vec<(String, Tensor<f32, 2, Cpu>)>;

        let world = strategy.num_replicas();
        log::info!(
            "mirrored training across {} devices: {:?}",
            world,
            strategy.devices()
        );

        let seed_weights = self.model.weights();
        let backends = CpuBackend::<f32>::ring(world);
        let optimizer = self.optimizer;
        let log_every = self.config.log_every_n_steps;
        let base_step = self.global_step;

        let (weights, last) = std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(world);

            for (backend, device) in backends.into_iter().zip(strategy.devices().iter().cloned()) {
                let weights = seed_weights.clone();

                handles.push(scope.spawn(move || -> Result<(f32, Option<Snapshot>)> {
                    let rank = backend.rank();
                    let mut replica = M::from_weights(weights)?;
                    let mut stream = input_fn();
                    let mut last = 0.0;

                    for step in 0..max_steps {
                        let batch = next_batch(&mut stream)?;
                        let shard = batch.shard(rank, world)?;
                        last = train_step(&mut replica, &optimizer, &shard, Some(&backend))?;

                        if rank == 0 && log_every > 0 && (base_step + step + 1) % log_every == 0 {
                            log::info!(
                                "step {} ({}): loss = {:.6}",
                                base_step + step + 1,
                                device,
                                last
                            );
                        }
                    }

                    // Replicas stay in lockstep, so rank 0's weights are
                    // everyone's weights.
                    let snapshot = (rank == 0).then(|| replica.weights());
                    Ok((last, snapshot))
                }));
            }

            let mut result = None;
            for handle in handles {
                let (loss, snapshot) = handle
                    .join()
                    .map_err(|_| TensorError::Distributed("replica thread panicked".to_string()))??;
                if let Some(weights) = snapshot {
                    result = Some((weights, loss));
                }
            }

            result.ok_or_else(|| {
                TensorError::Distributed("no replica reported final weights".to_string())
            })
        })?;

        self.model = M::from_weights(weights)?;
        self.global_step += max_steps;
        Ok(last)
    }

    /// Evaluates the current model over `steps` batches.
    pub fn evaluate<F, I>(&self, input_fn: F, steps: usize) -> Result<EvalMetrics>
    where
        F: Fn() -> I,
        I: Iterator<Item = Batch>,
    {
        if steps == 0 {
            return Err(TensorError::InvalidConfig(
                "evaluation needs at least one step".to_string(),
            ));
        }

        let mut stream = input_fn();
        let mut total = 0.0f32;

        for _ in 0..steps {
            let batch = next_batch(&mut stream)?;
            let labels = batch.labels.clone().reshape([batch.batch_size(), 1])?;
            let pred = self.model.forward(&batch.features)?;
            total += mean_squared_error(&pred.data, &labels)?;
        }

        let loss = total / steps as f32;
        Ok(EvalMetrics {
            loss,
            mse: loss,
            steps,
        })
    }

    /// Runs the model over `steps` batches, returning the flattened
    /// regression outputs in input order.
    pub fn predict<F, I>(&self, input_fn: F, steps: usize) -> Result<Vec<f32>>
    where
        F: Fn() -> I,
        I: Iterator<Item = Batch>,
    {
        let mut stream = input_fn();
        let mut outputs = Vec::new();

        for _ in 0..steps {
            let batch = next_batch(&mut stream)?;
            let pred = self.model.forward(&batch.features)?;
            outputs.extend_from_slice(pred.data.data());
        }

        Ok(outputs)
    }

    fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config.model_dir)
            .map_err(|e| TensorError::Checkpoint(format!("cannot create model dir: {}", e)))?;

        let path = checkpoint_path(&self.config.model_dir);
        checkpoint::save_checkpoint(&path, &self.model.weights())?;
        log::info!(
            "saved checkpoint to {} at step {}",
            path.display(),
            self.global_step
        );
        Ok(())
    }
}

/// Trains to the train spec's step budget, then evaluates with the eval
/// spec and returns the metrics.
pub fn train_and_evaluate<M, FT, IT, FE, IE>(
    estimator: &mut Estimator<M>,
    train_spec: TrainSpec<FT>,
    eval_spec: EvalSpec<FE>,
) -> Result<EvalMetrics>
where
    M: EstimatorModel,
    FT: Fn() -> IT + Sync,
    IT: Iterator<Item = Batch>,
    FE: Fn() -> IE,
    IE: Iterator<Item = Batch>,
{
    let final_loss = estimator.train(train_spec.input_fn, train_spec.max_steps)?;
    log::info!(
        "training finished at step {} (final loss {:.6})",
        estimator.global_step(),
        final_loss
    );

    let metrics = estimator.evaluate(eval_spec.input_fn, eval_spec.steps)?;
    log::info!(
        "evaluation over {} steps: loss = {:.6}, mse = {:.6}",
        metrics.steps,
        metrics.loss,
        metrics.mse
    );
    Ok(metrics)
}

/// One optimisation step: forward, loss, backward, then a (possibly
/// all-reduced) SGD update per parameter. Returns the step's loss.
fn train_step<M: EstimatorModel>(
    model: &mut M,
    optimizer: &Sgd<f32>,
    batch: &Batch,
    reducer: Option<&CpuBackend<f32>>,
) -> Result<f32> {
    let labels = batch.labels.clone().reshape([batch.batch_size(), 1])?;

    let pred = model.forward(&batch.features)?;
    let loss = mse_loss(&pred, &labels)?;
    loss.backward();
    let loss_value = loss.data.data()[0];

    for param in model.params() {
        let grad = param.take_grad().ok_or_else(|| {
            TensorError::Unsupported("parameter received no gradient".to_string())
        })?;

        let grad = match reducer {
            Some(backend) => all_reduce_mean(backend, &grad)?,
            None => grad,
        };

        optimizer.update(&mut param.data, &grad)?;
    }

    Ok(loss_value)
}

fn next_batch<I: Iterator<Item = Batch>>(stream: &mut I) -> Result<Batch> {
    stream
        .next()
        .ok_or_else(|| TensorError::InvalidConfig("input stream exhausted".to_string()))
}

fn checkpoint_path(dir: &Path) -> PathBuf {
    dir.join("model.safetensors")
}
