use ndarray::{Array2, ArrayView2};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{MlErr, Result, arch::Mode};

/// Randomly zeroes inputs with probability `p` while training, scaling the survivors by
/// `1 / (1 - p)`. In evaluation mode it is the identity.
#[derive(Clone, Debug)]
pub struct Dropout {
    p: f32,
    rng: StdRng,
    mask: Option<Array2<f32>>,
}

impl Dropout {
    /// Creates a new `Dropout` layer.
    ///
    /// # Arguments
    /// * `p` - The probability of dropping each unit, in `[0, 1)`.
    /// * `seed` - The seed of this layer's own random source.
    ///
    /// # Returns
    /// A new `Dropout` instance or an error if `p` is out of range.
    pub fn new(p: f32, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(MlErr::InvalidConfig(format!(
                "dropout probability must be in [0, 1), got {p}"
            )));
        }

        Ok(Self {
            p,
            rng: StdRng::seed_from_u64(seed),
            mask: None,
        })
    }

    pub fn p(&self) -> f32 {
        self.p
    }

    pub fn forward(&mut self, x: ArrayView2<f32>, mode: Mode) -> Array2<f32> {
        if mode == Mode::Eval || self.p == 0. {
            self.mask = None;
            return x.to_owned();
        }

        let p = self.p;
        let scale = 1. / (1. - p);
        let rng = &mut self.rng;

        let mask = Array2::from_shape_simple_fn(x.raw_dim(), || {
            if rng.random::<f32>() < p { 0. } else { scale }
        });

        let y = &x * &mask;
        self.mask = Some(mask);
        y
    }

    pub fn backward(&self, d: Array2<f32>) -> Array2<f32> {
        match &self.mask {
            Some(mask) => d * mask,
            None => d,
        }
    }
}
