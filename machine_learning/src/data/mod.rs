mod dataloader;
mod dataset;
mod synthetic;

pub use dataloader::{Batches, DataLoader};
pub use dataset::{Batch, Dataset};
pub use synthetic::{NUM_CLASSES, SAMPLE_DIM, SyntheticDataset, chunk_argmax};
