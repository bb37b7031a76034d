use ndarray::{Array2, ArrayView2};

/// Shifts every input value by a constant offset, it has no parameters.
#[derive(Clone, Copy, Debug)]
pub struct Center {
    offset: f32,
}

impl Center {
    /// Creates a new `Center` layer that subtracts `offset` from its inputs.
    pub fn new(offset: f32) -> Self {
        Self { offset }
    }

    pub fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        &x - self.offset
    }

    /// The shift has a unit derivative, deltas pass through untouched.
    pub fn backward(&self, d: Array2<f32>) -> Array2<f32> {
        d
    }
}
