//! Neural classifier stages and their composition.

pub mod attention;
pub mod classifier;
pub mod config;
pub mod embedding;
pub mod head;
mod init;
pub mod recurrent;

pub use attention::{Attention, masked_softmax};
pub use classifier::{ClassifierOutput, SequenceClassifier};
pub use config::ModelConfig;
pub use embedding::CharEmbedding;
pub use head::ClassifierHead;
pub use recurrent::{BiLstmEncoder, EncoderOutput, masked_update};

/// Whether a forward pass is part of training.
///
/// Passed explicitly to every stage; dropout is only active in
/// [`Mode::Train`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Train,
    Eval,
}

impl Mode {
    pub fn is_train(self) -> bool {
        matches!(self, Mode::Train)
    }
}
