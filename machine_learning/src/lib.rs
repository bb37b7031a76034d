use std::collections::BTreeMap;

use ndarray::ArrayD;

pub mod arch;
pub mod checkpoint;
pub mod data;
pub mod error;
pub mod initialization;
pub mod ops;
pub mod optimization;
pub mod training;

pub use error::{MlErr, Result};

/// Named tensors describing the state of a model or an optimizer, ordered by name.
pub type StateDict = BTreeMap<String, ArrayD<f32>>;
