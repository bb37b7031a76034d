use ndarray::{linalg, prelude::*};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer, `act_fn(x · W + b)`.
///
/// Its parameters are laid out as the row major `(n, m)` weights followed by the `m` biases.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Option<Array2<f32>>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output sizes.
    /// * `act_fn` - An optional activation applied to the output.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: None,
            z: Array2::zeros((0, dim.1)),
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense layer input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = x.dot(&w);
        z += &b;

        self.x = Some(x.to_owned());

        let a = match &self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        };

        self.z = z;
        Ok(a)
    }

    /// Accumulates this layer's gradient into `grad` and returns the delta for the previous
    /// layer.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        let Some(x) = &self.x else {
            return Err(MlErr::MissingForward);
        };

        if d.dim() != self.z.dim() {
            return Err(MlErr::SizeMismatch {
                what: "dense layer delta",
                got: d.len(),
                expected: self.z.len(),
            });
        }

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &d, 1.0, &mut dw);
        db += &d.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    ///
    /// # Arguments
    /// * `grad` - A gradient slice.
    ///
    /// # Returns
    /// A tuple containing the delta weights and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("gradient", grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).map_err(shape_err)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).map_err(shape_err)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("parameters", params.len())?;

        let w_size = self.size - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size]).map_err(shape_err)?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..]).map_err(shape_err)?;
        Ok((weights, biases))
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }
}

fn shape_err(e: ndarray::ShapeError) -> MlErr {
    MlErr::InvalidConfig(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // w = [[1, 2], [3, 4], [5, 6]], b = [0.5, -100]
    const PARAMS: [f32; 8] = [1., 2., 3., 4., 5., 6., 0.5, -100.];

    #[test]
    fn forward_applies_weights_biases_and_activation() {
        let mut dense = Dense::new((3, 2), Some(ActFn::relu()));
        let x = array![[1., 0., 1.], [0., 1., 0.]];

        let y = dense.forward(&PARAMS, x.view()).unwrap();
        assert_eq!(y, array![[6.5, 0.], [3.5, 0.]]);
    }

    #[test]
    fn backward_accumulates_gradients() {
        let mut dense = Dense::new((3, 2), None);
        let x = array![[1., 2., 3.]];
        let mut grad = [0.; 8];

        dense.forward(&PARAMS, x.view()).unwrap();
        let d_prev = dense
            .backward(&PARAMS, &mut grad, array![[1., -1.]])
            .unwrap();

        assert_eq!(grad, [1., -1., 2., -2., 3., -3., 1., -1.]);
        assert_eq!(d_prev, array![[-1., -1., -1.]]);

        dense.backward(&PARAMS, &mut grad, array![[1., -1.]]).unwrap();
        assert_eq!(grad, [2., -2., 4., -4., 6., -6., 2., -2.]);
    }

    #[test]
    fn backward_before_forward_fails() {
        let mut dense = Dense::new((3, 2), None);
        let mut grad = [0.; 8];

        assert!(matches!(
            dense.backward(&PARAMS, &mut grad, array![[1., 1.]]),
            Err(MlErr::MissingForward)
        ));
    }

    #[test]
    fn wrong_input_width_fails() {
        let mut dense = Dense::new((3, 2), None);
        assert!(dense.forward(&PARAMS, array![[1., 2.]].view()).is_err());
        assert!(dense.forward(&PARAMS[..7], array![[1., 2., 3.]].view()).is_err());
    }
}
