use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::Result;

/// A classification loss over raw scores and integer labels.
pub trait LossFn {
    /// Computes the loss of a batch.
    ///
    /// # Arguments
    /// * `y_pred` - The model's raw scores, one row per sample.
    /// * `y` - The true class of each row.
    ///
    /// # Returns
    /// The batch loss or an error if the labels don't fit the scores.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView1<usize>) -> Result<f32>;

    /// Computes the derivative of `loss` with respect to each score.
    ///
    /// # Arguments
    /// * `y_pred` - The model's raw scores, one row per sample.
    /// * `y` - The true class of each row.
    ///
    /// # Returns
    /// An array shaped like `y_pred` or an error if the labels don't fit the scores.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView1<usize>) -> Result<Array2<f32>>;
}
