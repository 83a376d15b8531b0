pub mod example;
pub mod prediction;

pub use example::{EncodedExample, TrainingExample};
pub use prediction::Prediction;
