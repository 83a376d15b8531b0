//! # Nomenclator
//!
//! Translate free-text clinical structure names into TG-263 standardized
//! nomenclature with a character-level BiLSTM + attention classifier.
//!
//! This crate re-exports [`nomenclator_core`] (inference, model bundle)
//! and [`nomenclator_trainer`] (synthetic data, training loop).
//!
//! ```no_run
//! use nomenclator::Translator;
//!
//! let translator = Translator::load("models/nomenclator.safetensors").unwrap();
//! for prediction in translator.predict("Lt Parotid", 3).unwrap() {
//!     println!("{prediction}");
//! }
//! ```

pub use nomenclator_core::*;
pub use nomenclator_trainer as trainer;
pub use nomenclator_trainer::{
    SyntheticDataGenerator, TrainingConfig, TrainingHistory, run_training,
};
