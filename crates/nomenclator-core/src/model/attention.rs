use candle_core::{D, Tensor};
use candle_nn::ops::softmax;
use candle_nn::{Linear, Module};

use super::init::ParamInit;
use crate::error::Result;

/// Additive bias pushed onto masked scores before normalisation.
const MASK_FILL: f64 = -1e9;

/// Softmax over the last dimension restricted to positions where `mask`
/// is 1.
///
/// Masked positions get exactly zero weight. A row with no valid position
/// comes out all zeros instead of NaN.
pub fn masked_softmax(scores: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let bias = mask.affine(-MASK_FILL, MASK_FILL)?;
    let weights = softmax(&scores.add(&bias)?, D::Minus1)?;
    Ok(weights.mul(mask)?)
}

/// Single-score attention pooling over encoder states.
pub struct Attention {
    score: Linear,
}

impl Attention {
    pub(crate) fn new(init: &mut ParamInit<'_>, state_dim: usize) -> Result<Self> {
        Ok(Self {
            score: init.linear("attention.score", state_dim, 1, true)?,
        })
    }

    /// `states`: `[batch, seq, dim]`, `mask`: `[batch, seq]`.
    ///
    /// Returns the context vector `[batch, dim]` and the weights
    /// `[batch, seq]`.
    pub fn forward(&self, states: &Tensor, mask: &Tensor) -> Result<(Tensor, Tensor)> {
        let scores = self.score.forward(states)?.squeeze(2)?;
        let weights = masked_softmax(&scores, mask)?;
        let context = weights.unsqueeze(1)?.matmul(states)?.squeeze(1)?;
        Ok((context, weights))
    }
}
