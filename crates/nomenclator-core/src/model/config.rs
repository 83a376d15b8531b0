use serde::{Deserialize, Serialize};

use crate::error::{NomenclatorError, Result};
use crate::vocab::STANDARD_NAMES;

/// Architecture hyperparameters of a [`SequenceClassifier`](super::SequenceClassifier).
///
/// Persisted in every model bundle so that loading needs no outside
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of output labels.
    pub num_labels: usize,
    /// Rows in the character embedding table.
    pub vocab_size: usize,
    /// Width of a character embedding.
    pub embedding_dim: usize,
    /// Hidden width of each recurrent direction.
    pub hidden_dim: usize,
    /// Stacked bidirectional layers.
    pub num_layers: usize,
    /// Dropout rate applied in training mode only.
    pub dropout: f32,
    /// Pool with attention instead of the final recurrent state.
    pub use_attention: bool,
    /// Fixed encoded sequence length.
    pub max_length: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_labels: STANDARD_NAMES.len(),
            vocab_size: 50,
            embedding_dim: 32,
            hidden_dim: 128,
            num_layers: 2,
            dropout: 0.3,
            use_attention: true,
            max_length: 64,
        }
    }
}

impl ModelConfig {
    /// Default architecture sized for the given label and vocabulary counts.
    pub fn new(num_labels: usize, vocab_size: usize) -> Self {
        Self {
            num_labels,
            vocab_size,
            ..Self::default()
        }
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

    /// Reject shapes the classifier cannot be built with.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("num_labels", self.num_labels),
            ("vocab_size", self.vocab_size),
            ("embedding_dim", self.embedding_dim),
            ("hidden_dim", self.hidden_dim),
            ("num_layers", self.num_layers),
            ("max_length", self.max_length),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(NomenclatorError::InvalidConfig(format!(
                "{name} must be greater than zero"
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(NomenclatorError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}
