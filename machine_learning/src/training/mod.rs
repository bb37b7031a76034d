mod epoch;
mod trainer;

pub use epoch::{EpochStats, run_epoch};
pub use trainer::{EpochReport, Trainer, TrainingState};
