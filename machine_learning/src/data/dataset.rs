use ndarray::{Array1, Array2, ArrayView1};

use crate::Result;

/// A collection of labelled samples that can be consumed by a `DataLoader`.
///
/// A `Dataset` is responsible only for *providing access* to samples, it does
/// not define how they are batched or ordered.
pub trait Dataset: Send + Sync + 'static {
    /// Returns the total number of samples.
    fn len(&self) -> usize;

    /// Returns `true` if the dataset holds no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the length of every sample.
    fn dim(&self) -> usize;

    /// Fetches a sample and its label by index.
    ///
    /// # Errors
    /// Returns `MlErr::IndexOutOfRange` if `index` is not lower than `len()`.
    fn get(&self, index: usize) -> Result<(ArrayView1<'_, f32>, usize)>;

    /// Copies the samples at `indices` into a new batch, keeping their order.
    ///
    /// # Arguments
    /// * `indices` - The positions of the samples to gather.
    ///
    /// # Returns
    /// The batch or an error if any index is out of range.
    fn gather(&self, indices: &[usize]) -> Result<Batch> {
        let mut x = Array2::zeros((indices.len(), self.dim()));
        let mut y = Array1::zeros(indices.len());

        for (i, &index) in indices.iter().enumerate() {
            let (sample, label) = self.get(index)?;
            x.row_mut(i).assign(&sample);
            y[i] = label;
        }

        Ok(Batch { x, y })
    }
}

/// A group of samples processed together.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// One sample per row.
    pub x: Array2<f32>,
    /// The label of each row of `x`.
    pub y: Array1<usize>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}
