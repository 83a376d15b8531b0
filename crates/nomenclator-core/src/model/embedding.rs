use candle_core::Tensor;
use candle_nn::{Embedding, Module};

use super::init::ParamInit;
use crate::error::Result;
use crate::vocab::PAD_INDEX;

/// Character embedding lookup.
///
/// Padded positions are multiplied out by the mask, so the padding row
/// neither reaches the encoder nor receives gradient.
pub struct CharEmbedding {
    table: Embedding,
}

impl CharEmbedding {
    pub(crate) fn new(init: &mut ParamInit<'_>, vocab_size: usize, dim: usize) -> Result<Self> {
        let weight = init.embedding_table("embedding.weight", vocab_size, dim, PAD_INDEX as usize)?;
        Ok(Self {
            table: Embedding::new(weight, dim),
        })
    }

    /// `ids`: `[batch, seq]` u32, `mask`: `[batch, seq]` f32.
    /// Returns `[batch, seq, dim]`.
    pub fn forward(&self, ids: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let embedded = self.table.forward(ids)?;
        Ok(embedded.broadcast_mul(&mask.unsqueeze(2)?)?)
    }
}
