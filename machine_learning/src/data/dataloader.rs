use std::{
    collections::VecDeque,
    num::NonZeroUsize,
    sync::{Arc, mpsc},
};

use log::debug;
use rand::{Rng, seq::SliceRandom};
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::{Batch, Dataset};
use crate::{MlErr, Result};

/// Produces batches over a dataset, one pass per `iter` call.
///
/// Setting workers only changes how batches are assembled: with `n > 0` workers up to `n`
/// batches are gathered on a dedicated pool ahead of the consumer, and yielded in the same
/// order the sequential loader would yield them.
pub struct DataLoader<D: Dataset> {
    dataset: Arc<D>,
    batch_size: NonZeroUsize,
    shuffle: bool,
    drop_last: bool,
    pool: Option<ThreadPool>,
}

impl<D: Dataset> DataLoader<D> {
    /// Creates a new sequential, non shuffling `DataLoader` that keeps the last partial batch.
    ///
    /// # Arguments
    /// * `dataset` - The dataset to iterate.
    /// * `batch_size` - The amount of samples per batch.
    ///
    /// # Returns
    /// A new `DataLoader` instance.
    pub fn new(dataset: D, batch_size: NonZeroUsize) -> Self {
        Self {
            dataset: Arc::new(dataset),
            batch_size,
            shuffle: false,
            drop_last: false,
            pool: None,
        }
    }

    /// Whether each pass visits the samples in a freshly randomized order.
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Whether a final batch smaller than the batch size is discarded.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Sets the amount of threads used to assemble batches, `0` assembles them on the
    /// caller's thread.
    ///
    /// # Returns
    /// The updated loader or an error if the thread pool couldn't be created.
    pub fn workers(mut self, workers: usize) -> Result<Self> {
        self.pool = match workers {
            0 => None,
            n => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("loader-{i}"))
                    .build()
                    .map_err(|e| MlErr::InvalidConfig(e.to_string()))?;

                Some(pool)
            }
        };

        Ok(self)
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    pub fn num_workers(&self) -> usize {
        self.pool
            .as_ref()
            .map_or(0, |pool| pool.current_num_threads())
    }

    /// Returns the amount of batches a single pass yields.
    pub fn num_batches(&self) -> usize {
        let n = self.dataset.len();
        let b = self.batch_size.get();

        if self.drop_last { n / b } else { n.div_ceil(b) }
    }

    /// Starts a new pass over the dataset. With workers, the first batches start being
    /// assembled right away.
    ///
    /// # Arguments
    /// * `rng` - The random source for the permutation, only used when shuffling.
    ///
    /// # Returns
    /// A lazy iterator over this pass' batches.
    pub fn iter<R: Rng + ?Sized>(&self, rng: &mut R) -> Batches<'_, D> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();

        if self.shuffle {
            indices.shuffle(rng);
        }

        if self.drop_last {
            let b = self.batch_size.get();
            indices.truncate(indices.len() / b * b);
        }

        let num_batches = indices.len().div_ceil(self.batch_size.get());
        debug!(
            "starting a pass of {num_batches} batches over {} samples",
            indices.len()
        );

        let mut batches = Batches {
            loader: self,
            indices: indices.into(),
            num_batches,
            yielded: 0,
            requested: 0,
            in_flight: VecDeque::new(),
        };
        batches.request_ahead();

        batches
    }
}

/// One pass of batches over a `DataLoader`'s dataset.
///
/// Batches handed to the loader's workers are tracked in request order, each with the
/// receiving end of the channel its worker delivers it through.
pub struct Batches<'dl, D: Dataset> {
    loader: &'dl DataLoader<D>,
    indices: Arc<[usize]>,
    num_batches: usize,
    yielded: usize,
    requested: usize,
    in_flight: VecDeque<mpsc::Receiver<Result<Batch>>>,
}

impl<D: Dataset> Batches<'_, D> {
    /// Returns the positions in `indices` of the samples of batch `i`.
    fn bounds(&self, i: usize) -> (usize, usize) {
        let b = self.loader.batch_size.get();
        let start = i * b;
        (start, (start + b).min(self.indices.len()))
    }

    /// Hands batches to the workers until as many are in flight as there are workers, or
    /// every batch of the pass has been requested.
    fn request_ahead(&mut self) {
        let loader = self.loader;
        let Some(pool) = &loader.pool else {
            return;
        };

        let workers = pool.current_num_threads();

        while self.in_flight.len() < workers && self.requested < self.num_batches {
            let (start, end) = self.bounds(self.requested);
            let dataset = Arc::clone(&loader.dataset);
            let indices = Arc::clone(&self.indices);
            let (tx, rx) = mpsc::channel();

            pool.spawn(move || {
                // The receiver is gone if the pass was dropped early.
                let _ = tx.send(dataset.gather(&indices[start..end]));
            });

            self.in_flight.push_back(rx);
            self.requested += 1;
        }
    }
}

impl<D: Dataset> Iterator for Batches<'_, D> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.yielded == self.num_batches {
            return None;
        }

        let batch = match self.in_flight.pop_front() {
            Some(rx) => {
                self.request_ahead();
                rx.recv().unwrap_or(Err(MlErr::WorkerLost))
            }
            None => {
                let (start, end) = self.bounds(self.yielded);
                self.loader.dataset.gather(&self.indices[start..end])
            }
        };

        self.yielded += 1;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.num_batches - self.yielded;
        (n, Some(n))
    }
}
