use ndarray::{Array2, ArrayView2};

use super::{Center, Dense, Dropout};
use crate::{Result, arch::{Mode, activations::ActFn}};

#[derive(Clone, Debug)]
pub enum Layer {
    Center(Center),
    Dense(Dense),
    Dropout(Dropout),
}

impl Layer {
    pub fn center(offset: f32) -> Self {
        Self::Center(Center::new(offset))
    }

    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self::Dense(Dense::new(dim, act_fn))
    }

    pub fn dropout(p: f32, seed: u64) -> Result<Self> {
        Ok(Self::Dropout(Dropout::new(p, seed)?))
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        match self {
            Self::Dense(l) => l.size(),
            Self::Center(_) | Self::Dropout(_) => 0,
        }
    }

    /// Returns the amount of inputs feeding each unit, zero for layers without parameters.
    pub fn fan_in(&self) -> usize {
        match self {
            Self::Dense(l) => l.dim().0,
            Self::Center(_) | Self::Dropout(_) => 0,
        }
    }

    /// Returns the name and shape of each of this layer's parameter tensors, in the order they
    /// are laid out in its parameter slice.
    pub fn param_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        match self {
            Self::Dense(l) => {
                let (n, m) = l.dim();
                vec![("weight", vec![n, m]), ("bias", vec![m])]
            }
            Self::Center(_) | Self::Dropout(_) => vec![],
        }
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>, mode: Mode) -> Result<Array2<f32>> {
        match self {
            Self::Center(l) => Ok(l.forward(x)),
            Self::Dense(l) => l.forward(params, x),
            Self::Dropout(l) => Ok(l.forward(x, mode)),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        match self {
            Self::Center(l) => Ok(l.backward(d)),
            Self::Dense(l) => l.backward(params, grad, d),
            Self::Dropout(l) => Ok(l.backward(d)),
        }
    }
}
