pub mod config;
pub mod session;

pub use config::{OptimizerKind, TrainingConfig};
pub use session::run;
