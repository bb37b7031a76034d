mod center;
mod dense;
mod dropout;
mod layer;

pub use center::Center;
pub use dense::Dense;
pub use dropout::Dropout;
pub use layer::Layer;
