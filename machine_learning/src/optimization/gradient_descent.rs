use super::{Optimizer, optimizer::check_sizes};
use crate::{MlErr, Result, StateDict};

/// Gradient descent optimization algorithm, it keeps no state between steps.
#[derive(Debug)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    /// Creates a new `GradientDescent` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    ///
    /// # Returns
    /// A new `GradientDescent` instance.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    /// Makes a step in the opposite direction of the gradient, with a length of `learning_rate`.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;

        let lr = self.learning_rate;

        for (p, g) in params.iter_mut().zip(grad) {
            *p -= lr * g;
        }

        Ok(())
    }

    fn state_dict(&self) -> Result<StateDict> {
        Ok(StateDict::new())
    }

    fn check_state_dict(&self, state: &StateDict) -> Result<()> {
        match state.keys().next() {
            Some(name) => Err(MlErr::StateMismatch(format!(
                "unexpected optimizer state {name}"
            ))),
            None => Ok(()),
        }
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        self.check_state_dict(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_against_the_gradient() {
        let mut params = [1., 1., 1.];
        GradientDescent::new(0.5)
            .update_params(&[2., -2., 0.], &mut params)
            .unwrap();

        assert_eq!(params, [0., 2., 1.]);
    }

    #[test]
    fn any_state_is_unexpected() {
        let state = StateDict::from([("exp_avg".to_string(), ndarray::arr1(&[0f32]).into_dyn())]);
        let mut descent = GradientDescent::new(0.5);

        assert!(descent.check_state_dict(&StateDict::new()).is_ok());
        assert!(matches!(
            descent.load_state_dict(&state),
            Err(MlErr::StateMismatch(_))
        ));
    }

    #[test]
    fn size_mismatch_fails() {
        let mut params = [1., 1.];
        assert!(GradientDescent::new(0.5).update_params(&[1.], &mut params).is_err());
    }
}
