use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::{Batch, DataLoader, Dataset};
use crate::neural_net::{dataset_accuracy, init_network_params, loss_and_grad, Params};
use crate::optim::Optimizer;
use crate::random::PrngKey;
use crate::util::{MlError, Result};

/// Everything the training loop needs apart from the optimizer itself.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub layer_sizes: Vec<usize>,
    pub param_scale: f64,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub eval_batch_size: usize,
    pub shuffle: bool,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Uninitialized,
    EpochRunning { epoch: usize },
    EpochComplete { epoch: usize },
    Finished,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingLog {
    pub losses: Vec<f64>,
    pub train_accuracy: Vec<f64>,
    pub test_accuracy: Vec<f64>,
    pub epoch_seconds: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub seconds: f64,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Epoch {} | T: {:.2} | Train A: {:.3} | Test A: {:.3}",
            self.epoch, self.seconds, self.train_accuracy, self.test_accuracy
        )
    }
}

struct Model<S> {
    params: Params,
    opt_state: S,
}

/// Drives epochs of training:
/// `Uninitialized -> EpochRunning -> EpochComplete -> ... -> Finished`.
pub struct Trainer<O: Optimizer> {
    config: TrainerConfig,
    optimizer: O,
    state: TrainingState,
    model: Option<Model<O::State>>,
    shuffle_key: PrngKey,
    steps: usize,
    log: TrainingLog,
}

impl<O: Optimizer> Trainer<O> {
    pub fn new(config: TrainerConfig, optimizer: O) -> Self {
        Self {
            shuffle_key: PrngKey::new(config.seed),
            config,
            optimizer,
            state: TrainingState::Uninitialized,
            model: None,
            steps: 0,
            log: TrainingLog::default(),
        }
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn log(&self) -> &TrainingLog {
        &self.log
    }

    pub fn params(&self) -> Option<&Params> {
        self.model.as_ref().map(|m| &m.params)
    }

    fn ensure_model(&mut self) -> Result<()> {
        if self.state == TrainingState::Finished {
            Err(MlError::TrainingFinished)?
        }
        if self.model.is_none() {
            let (init_key, shuffle_key) = PrngKey::new(self.config.seed).split();
            let params = init_network_params(&self.config.layer_sizes, init_key, self.config.param_scale)?;
            info!(
                sizes = ?params.sizes(),
                parameters = params.num_parameters(),
                "initialized network"
            );

            self.shuffle_key = shuffle_key;
            let opt_state = self.optimizer.init(&params);
            self.model = Some(Model { params, opt_state });
        }
        Ok(())
    }

    /// Any failure while training ends the run; the last good parameters stay in place.
    fn halt_on_err<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = TrainingState::Finished;
        }
        result
    }

    fn apply_step(&mut self, batch: &Batch) -> Result<f64> {
        let step = self.steps;
        let Some(model) = self.model.take() else {
            return Err(MlError::TrainingFinished);
        };
        let (loss, grads) = match loss_and_grad(&model.params, batch) {
            Ok(value) => value,
            Err(err) => {
                self.model = Some(model);
                return Err(err);
            }
        };
        if !loss.is_finite() {
            self.model = Some(model);
            return Err(MlError::NonFiniteLoss { step, loss });
        }
        // grads come from the same params, so the shapes always agree here
        let (params, opt_state) = self.optimizer.update(&grads, model.opt_state, &model.params)?;
        self.model = Some(Model { params, opt_state });

        debug!(step, loss, "train step");
        self.steps += 1;
        self.log.losses.push(loss);
        Ok(loss)
    }

    /// Single optimizer step on `batch`; the loss is appended to the log.
    pub fn step(&mut self, batch: &Batch) -> Result<f64> {
        self.ensure_model()?;
        let result = self.apply_step(batch);
        self.halt_on_err(result)
    }

    fn next_epoch(&self) -> Option<usize> {
        let epoch = match self.state {
            TrainingState::Finished => return None,
            TrainingState::Uninitialized => 1,
            TrainingState::EpochRunning { epoch } | TrainingState::EpochComplete { epoch } => epoch + 1,
        };
        (epoch <= self.config.num_epochs).then_some(epoch)
    }

    /// Train on every batch of `train` once, then measure accuracy on both splits.
    pub fn run_epoch(&mut self, train: &Dataset, test: &Dataset) -> Result<EpochReport> {
        let Some(epoch) = self.next_epoch() else {
            self.state = TrainingState::Finished;
            return Err(MlError::TrainingFinished);
        };
        self.ensure_model()?;
        self.state = TrainingState::EpochRunning { epoch };
        let result = self.train_epoch(epoch, train, test);
        self.halt_on_err(result)
    }

    fn train_epoch(&mut self, epoch: usize, train: &Dataset, test: &Dataset) -> Result<EpochReport> {
        let start = Instant::now();
        let (epoch_key, next_key) = self.shuffle_key.split();
        self.shuffle_key = next_key;

        let loader = DataLoader::new(train, self.config.batch_size, self.config.shuffle)?;
        for batch in loader.batches(epoch_key) {
            self.apply_step(&batch)?;
        }
        let seconds = start.elapsed().as_secs_f64();

        let Some(model) = &self.model else {
            return Err(MlError::TrainingFinished);
        };
        let train_accuracy =
            dataset_accuracy(&model.params, &DataLoader::new(train, self.config.eval_batch_size, false)?)?;
        let test_accuracy =
            dataset_accuracy(&model.params, &DataLoader::new(test, self.config.eval_batch_size, false)?)?;

        self.log.train_accuracy.push(train_accuracy);
        self.log.test_accuracy.push(test_accuracy);
        self.log.epoch_seconds.push(seconds);

        self.state = if epoch >= self.config.num_epochs {
            TrainingState::Finished
        } else {
            TrainingState::EpochComplete { epoch }
        };

        info!(epoch, seconds, train_accuracy, test_accuracy, "epoch complete");
        Ok(EpochReport { epoch, seconds, train_accuracy, test_accuracy })
    }

    /// Run the remaining epochs, handing every report to `on_epoch`.
    pub fn run(
        &mut self,
        train: &Dataset,
        test: &Dataset,
        mut on_epoch: impl FnMut(&EpochReport),
    ) -> Result<Vec<EpochReport>> {
        let mut reports = Vec::with_capacity(self.config.num_epochs);
        while self.next_epoch().is_some() {
            let report = self.run_epoch(train, test)?;
            on_epoch(&report);
            reports.push(report);
        }
        self.state = TrainingState::Finished;
        Ok(reports)
    }
}

pub fn save_params(path: &Path, params: &Params) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_pickle::to_writer(&mut writer, params, serde_pickle::SerOptions::new())?;
    info!(path = %path.display(), "saved parameters");
    Ok(())
}

/// Read a checkpoint written by [`save_params`]; the layer shapes are checked on load.
pub fn load_params(path: &Path) -> Result<Params> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_pickle::from_reader(reader, serde_pickle::DeOptions::new())?)
}
