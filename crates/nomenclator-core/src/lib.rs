//! # Nomenclator Core
//!
//! Character-level neural translation of free-text clinical structure
//! names ("Lt Parotid", "SPINAL CORD PRV") into a closed set of TG-263
//! standardized names. Provides the vocabulary and label registry, the
//! string encoder, the BiLSTM + attention sequence classifier, the
//! single-file model bundle and the [`Translator`] inference façade.
//!
//! ## Quick Start
//!
//! ```rust
//! use candle_core::Device;
//! use nomenclator_core::{LabelSet, ModelConfig, SequenceClassifier, Translator, Vocabulary};
//!
//! let vocabulary = Vocabulary::new();
//! let labels = LabelSet::standard();
//! let config = ModelConfig::new(labels.len(), vocabulary.len()).with_hidden_dim(16);
//! let classifier = SequenceClassifier::new(config, 42, &Device::Cpu).unwrap();
//! let translator = Translator::new(classifier, vocabulary, labels).unwrap();
//!
//! let predictions = translator.predict("left parotid", 3).unwrap();
//! assert_eq!(predictions.len(), 3);
//! assert!(predictions[0].confidence >= predictions[1].confidence);
//! ```
pub mod bundle;
pub mod encoder;
pub mod error;
pub mod model;
pub mod translator;
pub mod types;
pub mod vocab;

// Re-export primary API
pub use bundle::{BUNDLE_SCHEMA_VERSION, ModelBundle, read_bundle, write_bundle};
pub use encoder::{EncodedBatch, EncodedText, encode};
pub use error::{NomenclatorError, Result};
pub use model::{ClassifierOutput, Mode, ModelConfig, SequenceClassifier};
pub use translator::{Translator, rank_top_k};
pub use types::{EncodedExample, Prediction, TrainingExample};
pub use vocab::{LabelSet, STANDARD_NAMES, Vocabulary};
