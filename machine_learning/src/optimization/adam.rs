use ndarray::{Array, ArrayD, IxDyn, arr0};

use super::{Optimizer, optimizer::check_sizes};
use crate::{MlErr, Result, StateDict};

const EXP_AVG: &str = "exp_avg";
const EXP_AVG_SQ: &str = "exp_avg_sq";
const BETA1_T: &str = "beta1_t";
const BETA2_T: &str = "beta2_t";

#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    v: Box<[f32]>,
    s: Box<[f32]>,
    epsilon: f32,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            v: vec![0.; len].into_boxed_slice(),
            s: vec![0.; len].into_boxed_slice(),
            epsilon,
        }
    }

    /// Creates a new `Adam` optimizer with `beta1 = 0.9`, `beta2 = 0.999` and `epsilon = 1e-8`.
    pub fn with_defaults(len: usize, learning_rate: f32) -> Self {
        Self::new(len, learning_rate, 0.9, 0.999, 1e-8)
    }

    fn moments_state(&self, name: &str) -> Result<ArrayD<f32>> {
        let moments = if name == EXP_AVG { &self.v } else { &self.s };

        Array::from_shape_vec(IxDyn(&[moments.len()]), moments.to_vec())
            .map_err(|e| MlErr::StateMismatch(format!("{name}: {e}")))
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;

        if self.v.len() != params.len() {
            return Err(MlErr::SizeMismatch {
                what: "adam moments",
                got: params.len(),
                expected: self.v.len(),
            });
        }

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        params
            .iter_mut()
            .zip(grad)
            .zip(self.v.iter_mut())
            .zip(self.s.iter_mut())
            .for_each(|(((p, g), v), s)| {
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *p -= step_size * *v / (s.sqrt() + eps);
            });

        Ok(())
    }

    fn state_dict(&self) -> Result<StateDict> {
        Ok(StateDict::from([
            (EXP_AVG.to_string(), self.moments_state(EXP_AVG)?),
            (EXP_AVG_SQ.to_string(), self.moments_state(EXP_AVG_SQ)?),
            (BETA1_T.to_string(), arr0(self.beta1_t).into_dyn()),
            (BETA2_T.to_string(), arr0(self.beta2_t).into_dyn()),
        ]))
    }

    fn check_state_dict(&self, state: &StateDict) -> Result<()> {
        let len = self.v.len();
        let expected = [
            (EXP_AVG, vec![len]),
            (EXP_AVG_SQ, vec![len]),
            (BETA1_T, vec![]),
            (BETA2_T, vec![]),
        ];

        for (name, shape) in &expected {
            let tensor = state
                .get(*name)
                .ok_or_else(|| MlErr::StateMismatch(format!("missing optimizer state {name}")))?;

            if tensor.shape() != shape.as_slice() {
                return Err(MlErr::StateMismatch(format!(
                    "{name}: expected shape {shape:?}, got {:?}",
                    tensor.shape()
                )));
            }
        }

        if let Some(unexpected) = state
            .keys()
            .find(|key| !expected.iter().any(|(name, _)| name == key))
        {
            return Err(MlErr::StateMismatch(format!(
                "unexpected optimizer state {unexpected}"
            )));
        }

        Ok(())
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        self.check_state_dict(state)?;

        let scalar = |name: &str| state[name].iter().copied().next().unwrap_or_default();

        self.v = state[EXP_AVG].iter().copied().collect();
        self.s = state[EXP_AVG_SQ].iter().copied().collect();
        self.beta1_t = scalar(BETA1_T);
        self.beta2_t = scalar(BETA2_T);

        Ok(())
    }
}
