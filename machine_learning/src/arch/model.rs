use ndarray::{Array2, ArrayView2};

use crate::{Result, StateDict, optimization::Optimizer};

/// Whether a model is being trained or evaluated.
///
/// Randomized regularization is only active in `Train` mode, in `Eval` mode the output is a
/// deterministic function of the input and the parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// A function with trainable parameters, mapping a batch of inputs to a batch of raw scores.
///
/// Gradient computation and parameter updates are only reachable through `backward` and
/// `step`.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    fn mode(&self) -> Mode;

    fn set_mode(&mut self, mode: Mode);

    /// Makes a forward pass through the model, remembering what `backward` needs.
    ///
    /// # Arguments
    /// * `x` - The input data, one sample per row.
    ///
    /// # Returns
    /// The raw scores for each sample or an error if the input has the wrong width.
    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Resets the accumulated gradient to zero.
    fn zero_grad(&mut self);

    /// Accumulates the gradient of the loss with respect to the parameters for the last
    /// forward pass.
    ///
    /// # Arguments
    /// * `d` - The derivative of the loss with respect to the last forward output.
    fn backward(&mut self, d: Array2<f32>) -> Result<()>;

    /// Applies one optimizer update to the parameters using the accumulated gradient.
    fn step<O: Optimizer + ?Sized>(&mut self, optimizer: &mut O) -> Result<()>;

    fn params(&self) -> &[f32];

    fn grad(&self) -> &[f32];

    /// Returns a copy of every parameter tensor keyed by name.
    fn state_dict(&self) -> Result<StateDict>;

    /// Checks that `state` holds exactly the tensors `load_state_dict` would accept.
    ///
    /// # Errors
    /// `MlErr::StateMismatch` if a tensor is missing, unexpected or has a different shape than
    /// the model's.
    fn check_state_dict(&self, state: &StateDict) -> Result<()>;

    /// Overwrites the parameters with the given tensors.
    ///
    /// # Errors
    /// Fails without modifying the model whenever `check_state_dict` would.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<()>;
}
