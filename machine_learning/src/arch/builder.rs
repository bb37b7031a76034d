use std::{cell::RefCell, rc::Rc};

use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{Sequential, activations::ActFn, layers::Layer};
use crate::{
    Result,
    initialization::RandParamGen,
};

/// The shape of the chunk classifier:
/// `center -> dense(in, hidden) + relu -> dropout -> dense(hidden, out)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassifierSpec {
    pub in_dim: usize,
    pub hidden_dim: usize,
    pub out_dim: usize,
    pub dropout: f32,
    pub center: f32,
}

impl ClassifierSpec {
    /// Creates a new `ClassifierSpec` with a hidden layer of 128 units, a dropout probability
    /// of 0.2 and inputs centered by 0.5.
    pub fn new(in_dim: usize, out_dim: usize) -> Self {
        Self {
            in_dim,
            hidden_dim: 128,
            out_dim,
            dropout: 0.2,
            center: 0.5,
        }
    }

    /// Returns the layers of the classifier, with every parameter still unset.
    ///
    /// # Arguments
    /// * `dropout_seed` - The seed of the dropout layer's random source.
    pub fn layers(&self, dropout_seed: u64) -> Result<Vec<Layer>> {
        Ok(vec![
            Layer::center(self.center),
            Layer::dense((self.in_dim, self.hidden_dim), Some(ActFn::relu())),
            Layer::dropout(self.dropout, dropout_seed)?,
            Layer::dense((self.hidden_dim, self.out_dim), None),
        ])
    }

    /// Builds the classifier, initializing each dense layer's weights and biases from
    /// `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`.
    ///
    /// # Arguments
    /// * `rng` - The random source every initial parameter and the dropout seed derive from.
    ///
    /// # Returns
    /// The initialized model or `MlErr::InvalidConfig` if some dimension is zero or the
    /// dropout probability is out of range.
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Sequential> {
        let dropout_seed = rng.random();
        let mut model = Sequential::new(self.layers(dropout_seed)?)?;

        let init_rng = Rc::new(RefCell::new(StdRng::seed_from_u64(rng.random())));
        model.init_params_with(|layer| {
            RandParamGen::fan_in_uniform(init_rng.clone(), layer.size(), layer.fan_in())
        })?;

        Ok(model)
    }
}
