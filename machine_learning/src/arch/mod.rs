pub mod activations;
mod builder;
pub mod layers;
pub mod loss;
mod model;
mod sequential;

pub use builder::ClassifierSpec;
pub use model::{Mode, Model};
pub use sequential::Sequential;
