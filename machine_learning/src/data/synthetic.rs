use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use ndarray_rand::{RandomExt, rand_distr::Uniform};
use rand::Rng;

use super::{Batch, Dataset};
use crate::{MlErr, Result, ops::argmax};

/// The length of every generated sample.
pub const SAMPLE_DIM: usize = 256;

/// The amount of classes, one per contiguous chunk of a sample.
pub const NUM_CLASSES: usize = 4;

/// A dataset of uniformly random vectors in `[0, 1)` labelled by the chunk with the
/// highest mean.
///
/// Samples are generated once at construction and never change afterwards.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    samples: Array2<f32>,
    labels: Array1<usize>,
    classes: usize,
}

impl SyntheticDataset {
    /// Creates a new `SyntheticDataset` of `SAMPLE_DIM` long samples split in `NUM_CLASSES` chunks.
    ///
    /// # Arguments
    /// * `len` - The amount of samples to generate.
    /// * `rng` - The random source for the samples.
    ///
    /// # Returns
    /// A new `SyntheticDataset` instance.
    pub fn new<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Result<Self> {
        Self::with_shape(len, SAMPLE_DIM, NUM_CLASSES, rng)
    }

    /// Creates a new `SyntheticDataset` with a custom sample length and amount of classes.
    ///
    /// # Arguments
    /// * `len` - The amount of samples to generate.
    /// * `dim` - The length of each sample.
    /// * `classes` - The amount of chunks each sample is split into.
    /// * `rng` - The random source for the samples.
    ///
    /// # Returns
    /// A new `SyntheticDataset` instance or an error if `dim` can't be split in `classes`
    /// equal non empty chunks.
    pub fn with_shape<R: Rng + ?Sized>(
        len: usize,
        dim: usize,
        classes: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if classes == 0 || dim == 0 || dim % classes != 0 {
            return Err(MlErr::InvalidConfig(format!(
                "a sample of length {dim} can't be split in {classes} equal chunks"
            )));
        }

        let distribution =
            Uniform::new(0.0f32, 1.0).map_err(|e| MlErr::InvalidConfig(e.to_string()))?;
        let samples = Array2::random_using((len, dim), distribution, rng);
        let labels = samples
            .outer_iter()
            .map(|sample| chunk_argmax(sample, classes))
            .collect();

        Ok(Self {
            samples,
            labels,
            classes,
        })
    }

    /// Returns the amount of classes the labels range over.
    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn samples(&self) -> &Array2<f32> {
        &self.samples
    }

    pub fn labels(&self) -> &Array1<usize> {
        &self.labels
    }
}

impl Dataset for SyntheticDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn dim(&self) -> usize {
        self.samples.ncols()
    }

    fn get(&self, index: usize) -> Result<(ArrayView1<'_, f32>, usize)> {
        let len = self.len();

        if index >= len {
            return Err(MlErr::IndexOutOfRange { index, len });
        }

        Ok((self.samples.row(index), self.labels[index]))
    }

    fn gather(&self, indices: &[usize]) -> Result<Batch> {
        let len = self.len();

        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(MlErr::IndexOutOfRange { index, len });
        }

        Ok(Batch {
            x: self.samples.select(Axis(0), indices),
            y: self.labels.select(Axis(0), indices),
        })
    }
}

/// Splits `sample` into `chunks` contiguous pieces of equal length and returns the index of
/// the one with the highest mean.
///
/// Trailing elements that don't fill a whole chunk are ignored.
pub fn chunk_argmax(sample: ArrayView1<f32>, chunks: usize) -> usize {
    let chunk = sample.len() / chunks.max(1);

    let means: Array1<f32> = (0..chunks)
        .map(|c| {
            sample
                .slice(s![c * chunk..(c + 1) * chunk])
                .mean()
                .unwrap_or_default()
        })
        .collect();

    argmax(means.view())
}
