use candle_core::Tensor;
use candle_nn::{Dropout, Linear, Module};

use super::Mode;
use super::init::ParamInit;
use crate::error::Result;

/// Linear -> ReLU -> Dropout -> Linear projection onto label logits.
pub struct ClassifierHead {
    hidden: Linear,
    output: Linear,
    dropout: Dropout,
}

impl ClassifierHead {
    pub(crate) fn new(
        init: &mut ParamInit<'_>,
        input_dim: usize,
        hidden_dim: usize,
        num_labels: usize,
        dropout: f32,
    ) -> Result<Self> {
        Ok(Self {
            hidden: init.linear("head.hidden", input_dim, hidden_dim, true)?,
            output: init.linear("head.output", hidden_dim, num_labels, true)?,
            dropout: Dropout::new(dropout),
        })
    }

    pub fn forward(&self, xs: &Tensor, mode: Mode) -> Result<Tensor> {
        let hidden = self.hidden.forward(xs)?.relu()?;
        let hidden = self.dropout.forward(&hidden, mode.is_train())?;
        Ok(self.output.forward(&hidden)?)
    }
}
