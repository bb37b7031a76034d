use crate::{MlErr, Result, StateDict};

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates the provided slice of parameters using the accumulated gradient.
    ///
    /// # Arguments
    /// * `grad` - A reference to the model's gradient.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad`, `params` or the optimizer's state.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;

    /// Returns a copy of the optimizer's internal state keyed by name.
    fn state_dict(&self) -> Result<StateDict>;

    /// Checks that `state` holds exactly the tensors `load_state_dict` would accept.
    ///
    /// # Errors
    /// `MlErr::StateMismatch` if a tensor is missing, unexpected or has a different shape than
    /// expected.
    fn check_state_dict(&self, state: &StateDict) -> Result<()>;

    /// Overwrites the optimizer's internal state.
    ///
    /// # Errors
    /// Fails without modifying the optimizer whenever `check_state_dict` would.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<()>;
}

impl<T: Optimizer + ?Sized> Optimizer for Box<T> {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        (**self).update_params(grad, params)
    }

    fn state_dict(&self) -> Result<StateDict> {
        (**self).state_dict()
    }

    fn check_state_dict(&self, state: &StateDict) -> Result<()> {
        (**self).check_state_dict(state)
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        (**self).load_state_dict(state)
    }
}

/// Fails with `MlErr::SizeMismatch` unless `grad` and `params` have the same length.
pub(super) fn check_sizes(grad: &[f32], params: &[f32]) -> Result<()> {
    if grad.len() != params.len() {
        return Err(MlErr::SizeMismatch {
            what: "gradient and parameters",
            got: grad.len(),
            expected: params.len(),
        });
    }

    Ok(())
}
