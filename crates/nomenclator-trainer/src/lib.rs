//! # Nomenclator Trainer
//!
//! Synthetic data generation and the training loop that produces
//! [`nomenclator_core::Translator`] bundles. The `train` binary wraps
//! [`run_training`]; the `translate` binary serves a saved bundle.

pub mod config;
pub mod data;
pub mod synthetic;
pub mod trainer;

pub use config::TrainingConfig;
pub use synthetic::{Noise, SyntheticDataGenerator};
pub use trainer::{
    EarlyStopping, EpochRecord, Metrics, PlateauSchedule, Termination, Trainer, TrainingHistory,
    TrainingOutcome, run_training,
};
