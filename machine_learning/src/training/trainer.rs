use std::{fmt, path::Path};

use log::{debug, info};
use rand::Rng;

use super::{EpochStats, run_epoch};
use crate::{
    Result, checkpoint,
    arch::{Mode, Model, loss::LossFn},
    data::{DataLoader, Dataset},
    optimization::Optimizer,
};

/// The state of a training run that outlives any single epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrainingState {
    /// The amount of completed epochs, which is also the index of the next one.
    pub epoch: usize,
    /// The best test accuracy observed so far.
    pub best_accuracy: f64,
}

/// The train and test results of one epoch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub train: EpochStats,
    pub test: EpochStats,
}

impl fmt::Display for EpochReport {
    /// Formats the report as `epoch train_accuracy train_loss test_accuracy test_loss`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.4} {:.4} {:.4} {:.4}",
            self.epoch, self.train.accuracy, self.train.loss, self.test.accuracy, self.test.loss
        )
    }
}

/// Alternates a training pass and an evaluation pass over its loaders, one epoch at a time.
pub struct Trainer<M, O, L, D, R>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
    D: Dataset,
    R: Rng,
{
    model: M,
    optimizer: O,
    loss_fn: L,
    train_loader: DataLoader<D>,
    test_loader: DataLoader<D>,
    rng: R,
    state: TrainingState,
}

impl<M, O, L, D, R> Trainer<M, O, L, D, R>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
    D: Dataset,
    R: Rng,
{
    /// Creates a new `Trainer` starting from epoch zero.
    ///
    /// # Arguments
    /// * `model` - The model that will be trained.
    /// * `optimizer` - The optimizer updating the model's parameters.
    /// * `loss_fn` - The loss function used to measure the difference between a model's output and the expected one.
    /// * `train_loader` - The loader of the training batches.
    /// * `test_loader` - The loader of the evaluation batches.
    /// * `rng` - The random source used to shuffle the loaders.
    pub fn new(
        model: M,
        optimizer: O,
        loss_fn: L,
        train_loader: DataLoader<D>,
        test_loader: DataLoader<D>,
        rng: R,
    ) -> Self {
        Self {
            model,
            optimizer,
            loss_fn,
            train_loader,
            test_loader,
            rng,
            state: TrainingState::default(),
        }
    }

    /// Replaces the training state, usually with one restored from a checkpoint.
    pub fn with_state(mut self, state: TrainingState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut O {
        &mut self.optimizer
    }

    /// Runs one training pass with parameter updates followed by one evaluation pass without
    /// them, then advances the training state.
    ///
    /// # Returns
    /// The report of the epoch just run.
    pub fn run_epoch(&mut self) -> Result<EpochReport> {
        let Self {
            model,
            optimizer,
            loss_fn,
            train_loader,
            test_loader,
            rng,
            state,
        } = self;

        let epoch = state.epoch;
        debug!("epoch {epoch}: training on {} batches", train_loader.num_batches());

        let train = run_epoch(
            model,
            train_loader.iter(rng),
            &*loss_fn,
            Some(optimizer),
            Mode::Train,
        )?;

        debug!("epoch {epoch}: evaluating on {} batches", test_loader.num_batches());

        let test = run_epoch(
            model,
            test_loader.iter(rng),
            &*loss_fn,
            None::<&mut O>,
            Mode::Eval,
        )?;

        state.epoch += 1;
        state.best_accuracy = state.best_accuracy.max(test.accuracy);

        Ok(EpochReport { epoch, train, test })
    }

    /// Runs epochs until `epochs` of them have been completed, counting the ones already
    /// present in the training state.
    ///
    /// # Arguments
    /// * `epochs` - The total amount of epochs of the run.
    /// * `on_epoch` - Called with the report of every epoch as soon as it finishes.
    ///
    /// # Returns
    /// The final training state.
    pub fn fit<F>(&mut self, epochs: usize, mut on_epoch: F) -> Result<TrainingState>
    where
        F: FnMut(&EpochReport),
    {
        if self.state.epoch >= epochs {
            info!(
                "nothing to train, {} of {epochs} epochs already completed",
                self.state.epoch
            );
        }

        while self.state.epoch < epochs {
            let report = self.run_epoch()?;
            on_epoch(&report);
        }

        Ok(self.state)
    }

    /// Saves the model, the optimizer and the training state to `path`.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        checkpoint::save(
            path,
            self.state.epoch,
            &self.model,
            &self.optimizer,
            self.state.best_accuracy,
        )
    }
}
