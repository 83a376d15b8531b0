//! Training configuration.

use std::path::PathBuf;

use nomenclator_core::{LabelSet, ModelConfig, NomenclatorError, Result, Vocabulary};
use serde::{Deserialize, Serialize};

/// Everything a training run needs besides the data.
///
/// Missing fields in a JSON config file fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Embedding table rows. `None` uses the vocabulary size.
    pub vocab_size: Option<usize>,
    pub embedding_dim: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub dropout: f32,
    pub use_attention: bool,
    pub max_length: usize,

    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Epochs without validation improvement before stopping.
    pub patience: usize,
    /// Multiplier applied to the learning rate on a plateau.
    pub lr_decay_factor: f64,
    /// Stalled epochs before the learning rate is decayed.
    pub lr_patience: usize,
    pub min_learning_rate: f64,
    /// Stop as soon as validation loss reaches this value.
    pub convergence_loss: Option<f32>,
    /// Reload the best validation state when training ends.
    pub restore_best: bool,
    /// Bundle written every time validation loss improves.
    pub checkpoint_path: Option<PathBuf>,

    pub variations_per_name: usize,
    /// Leading fraction of the dataset held out for validation.
    pub validation_split: f32,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            vocab_size: None,
            embedding_dim: 32,
            hidden_dim: 128,
            num_layers: 2,
            dropout: 0.3,
            use_attention: true,
            max_length: 64,
            epochs: 50,
            batch_size: 32,
            learning_rate: 1e-3,
            patience: 7,
            lr_decay_factor: 0.5,
            lr_patience: 3,
            min_learning_rate: 0.0,
            convergence_loss: None,
            restore_best: true,
            checkpoint_path: None,
            variations_per_name: 20,
            validation_split: 0.2,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Read a JSON config file.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_hidden_dim(mut self, dim: usize) -> Self {
        self.hidden_dim = dim;
        self
    }

    pub fn with_num_layers(mut self, layers: usize) -> Self {
        self.num_layers = layers;
        self
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_attention(mut self, enabled: bool) -> Self {
        self.use_attention = enabled;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_lr_schedule(mut self, decay_factor: f64, patience: usize) -> Self {
        self.lr_decay_factor = decay_factor;
        self.lr_patience = patience;
        self
    }

    pub fn with_min_learning_rate(mut self, lr: f64) -> Self {
        self.min_learning_rate = lr;
        self
    }

    pub fn with_convergence_loss(mut self, loss: Option<f32>) -> Self {
        self.convergence_loss = loss;
        self
    }

    pub fn with_restore_best(mut self, restore: bool) -> Self {
        self.restore_best = restore;
        self
    }

    pub fn with_checkpoint_path(mut self, path: Option<PathBuf>) -> Self {
        self.checkpoint_path = path;
        self
    }

    pub fn with_variations_per_name(mut self, count: usize) -> Self {
        self.variations_per_name = count;
        self
    }

    pub fn with_validation_split(mut self, fraction: f32) -> Self {
        self.validation_split = fraction;
        self
    }

    pub fn with_vocab_size(mut self, size: Option<usize>) -> Self {
        self.vocab_size = size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reject settings no training run can use.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(NomenclatorError::InvalidConfig(msg));

        if self.epochs == 0 {
            return invalid("epochs must be positive".into());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive".into());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if self.patience == 0 || self.lr_patience == 0 {
            return invalid("patience and lr_patience must be positive".into());
        }
        if !(self.lr_decay_factor > 0.0 && self.lr_decay_factor <= 1.0) {
            return invalid(format!(
                "lr_decay_factor must be in (0, 1], got {}",
                self.lr_decay_factor
            ));
        }
        if !(self.min_learning_rate >= 0.0) {
            return invalid(format!(
                "min_learning_rate must be non-negative, got {}",
                self.min_learning_rate
            ));
        }
        if self.variations_per_name == 0 {
            return invalid("variations_per_name must be positive".into());
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return invalid(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            ));
        }
        Ok(())
    }

    /// Architecture for a classifier over `vocabulary` and `labels`.
    pub fn model_config(&self, vocabulary: &Vocabulary, labels: &LabelSet) -> Result<ModelConfig> {
        let vocab_size = match self.vocab_size {
            Some(size) if size < vocabulary.len() => {
                return Err(NomenclatorError::InvalidConfig(format!(
                    "vocab_size {size} is smaller than the {}-token vocabulary",
                    vocabulary.len()
                )));
            }
            Some(size) => size,
            None => vocabulary.len(),
        };

        let config = ModelConfig::new(labels.len(), vocab_size)
            .with_embedding_dim(self.embedding_dim)
            .with_hidden_dim(self.hidden_dim)
            .with_num_layers(self.num_layers)
            .with_dropout(self.dropout)
            .with_attention(self.use_attention)
            .with_max_length(self.max_length);
        config.validate()?;
        Ok(config)
    }
}
