use serde::{Deserialize, Serialize};

use crate::encoder::{EncodedText, encode};
use crate::error::Result;
use crate::vocab::{LabelSet, Vocabulary};

/// A clinical name paired with the standardized name it should map to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Free-text name as it might appear in a structure set.
    pub text: String,
    /// Standardized label name.
    pub label: String,
}

impl TrainingExample {
    pub fn new(text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
        }
    }

    /// Encode the text and resolve the label index.
    ///
    /// A label outside `labels` is an [`UnknownLabel`](crate::NomenclatorError::UnknownLabel)
    /// error.
    pub fn encode(
        &self,
        vocab: &Vocabulary,
        labels: &LabelSet,
        max_length: usize,
    ) -> Result<EncodedExample> {
        let label = labels.require(&self.label)?;
        Ok(EncodedExample {
            text: encode(vocab, &self.text, max_length),
            label,
        })
    }
}

/// An encoded training example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedExample {
    pub text: EncodedText,
    pub label: usize,
}
