use log::debug;

use crate::{
    MlErr, Result,
    arch::{Mode, Model, loss::LossFn},
    data::Batch,
    ops,
    optimization::Optimizer,
};

/// The outcome of a single pass over a sequence of batches.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochStats {
    /// `correct / samples`, in `[0, 1]`.
    pub accuracy: f64,
    /// The loss of the last batch of the pass, not a mean over the epoch.
    pub loss: f32,
    pub samples: usize,
    pub correct: usize,
}

/// Runs every batch of `batches` through `model` once.
///
/// In `Mode::Train` every batch is followed by a gradient computation and one `optimizer`
/// step; in `Mode::Eval` the parameters are left untouched.
///
/// # Arguments
/// * `model` - The model to run, its mode is set to `mode`.
/// * `batches` - The batches of a single epoch.
/// * `loss_fn` - The loss measuring the model's raw scores against the labels.
/// * `optimizer` - The update mechanism, required in `Mode::Train`.
/// * `mode` - Whether to train or evaluate.
///
/// # Returns
/// The accuracy over every sample and the loss of the last batch.
///
/// # Errors
/// `MlErr::MissingOptimizer` if training without an optimizer, checked before any batch is
/// consumed. `MlErr::EmptyEpoch` if `batches` yields nothing. Any error produced by the
/// batches, the model or the loss.
pub fn run_epoch<M, I, L, O>(
    model: &mut M,
    batches: I,
    loss_fn: &L,
    mut optimizer: Option<&mut O>,
    mode: Mode,
) -> Result<EpochStats>
where
    M: Model,
    I: IntoIterator<Item = Result<Batch>>,
    L: LossFn + ?Sized,
    O: Optimizer + ?Sized,
{
    if mode == Mode::Train && optimizer.is_none() {
        return Err(MlErr::MissingOptimizer);
    }

    model.set_mode(mode);

    let mut samples = 0;
    let mut correct = 0;
    let mut last_loss = None;

    for (i, batch) in batches.into_iter().enumerate() {
        let Batch { x, y } = batch?;

        let scores = model.forward(x.view())?;
        let loss = loss_fn.loss(scores.view(), y.view())?;

        match optimizer.as_deref_mut() {
            Some(optimizer) if mode == Mode::Train => {
                let d = loss_fn.loss_prime(scores.view(), y.view())?;
                model.zero_grad();
                model.backward(d)?;
                model.step(optimizer)?;
            }
            _ => {}
        }

        samples += y.len();
        correct += ops::count_correct(scores.view(), y.view());
        last_loss = Some(loss);

        debug!("{mode:?} batch {i}: {} samples, loss {loss}", y.len());
    }

    let loss = last_loss.ok_or(MlErr::EmptyEpoch)?;

    let accuracy = if samples == 0 {
        0.
    } else {
        correct as f64 / samples as f64
    };

    Ok(EpochStats {
        accuracy,
        loss,
        samples,
        correct,
    })
}
