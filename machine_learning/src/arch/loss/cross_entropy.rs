use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use super::LossFn;
use crate::{MlErr, Result};

/// Multi-class cross entropy over raw scores.
///
/// The softmax normalization is folded into the loss, so the scores are never normalized
/// beforehand. The batch loss is the mean over its rows.
#[derive(Default, Clone, Copy, Debug)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }

    fn check(&self, y_pred: ArrayView2<f32>, y: ArrayView1<usize>) -> Result<()> {
        if y_pred.nrows() != y.len() {
            return Err(MlErr::SizeMismatch {
                what: "scores and labels",
                got: y.len(),
                expected: y_pred.nrows(),
            });
        }

        let classes = y_pred.ncols();

        match y.iter().find(|&&label| label >= classes) {
            Some(&label) => Err(MlErr::InvalidLabel { label, classes }),
            None => Ok(()),
        }
    }
}

/// Numerically stable `log(sum(exp(row)))`.
fn log_sum_exp(row: ArrayView1<f32>) -> f32 {
    let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    max + row.mapv(|v| (v - max).exp()).sum().ln()
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView1<usize>) -> Result<f32> {
        self.check(y_pred, y)?;

        let total: f32 = y_pred
            .outer_iter()
            .zip(y)
            .map(|(row, &label)| log_sum_exp(row) - row[label])
            .sum();

        Ok(total / y.len() as f32)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView1<usize>) -> Result<Array2<f32>> {
        self.check(y_pred, y)?;

        let n = y.len() as f32;
        let mut d = y_pred.to_owned();

        for (mut row, &label) in d.axis_iter_mut(Axis(0)).zip(y) {
            let lse = log_sum_exp(row.view());
            row.mapv_inplace(|v| (v - lse).exp() / n);
            row[label] -= 1. / n;
        }

        Ok(d)
    }
}
