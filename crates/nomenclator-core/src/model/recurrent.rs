//! # Bidirectional LSTM Encoder
//!
//! Runs every layer left-to-right and right-to-left over the embedded
//! sequence. Each step is gated by the length mask: on padded positions
//! the state is carried through unchanged and the emitted output is zero,
//! so padding never reaches the summary state or the attention input.

use candle_core::{D, DType, Tensor};
use candle_nn::ops::sigmoid;
use candle_nn::{Dropout, Linear, Module};

use super::Mode;
use super::init::ParamInit;
use crate::error::Result;

/// Per-position states and the final summary of a bidirectional pass.
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    /// `[batch, seq, 2 * hidden]`, zero on padded positions.
    pub states: Tensor,
    /// `[batch, 2 * hidden]`: last valid forward state next to the last
    /// valid backward state.
    pub summary: Tensor,
}

/// Keep `prev` where `mask` is 0 and take `next` where it is 1.
///
/// `mask` is `[batch, 1]` and broadcasts over the hidden dimension.
pub fn masked_update(prev: &Tensor, next: &Tensor, mask: &Tensor) -> Result<Tensor> {
    Ok(prev.add(&next.sub(prev)?.broadcast_mul(mask)?)?)
}

struct LstmDirection {
    input: Linear,
    recurrent: Linear,
    hidden_dim: usize,
    reverse: bool,
}

impl LstmDirection {
    fn new(
        init: &mut ParamInit<'_>,
        prefix: &str,
        input_dim: usize,
        hidden_dim: usize,
        reverse: bool,
    ) -> Result<Self> {
        let bound = 1.0 / (hidden_dim as f32).sqrt();
        let gates = 4 * hidden_dim;
        let input = Linear::new(
            init.uniform(&format!("{prefix}.w_ih"), (gates, input_dim), bound)?,
            Some(init.uniform(&format!("{prefix}.b_ih"), gates, bound)?),
        );
        let recurrent = Linear::new(
            init.uniform(&format!("{prefix}.w_hh"), (gates, hidden_dim), bound)?,
            Some(init.uniform(&format!("{prefix}.b_hh"), gates, bound)?),
        );

        Ok(Self {
            input,
            recurrent,
            hidden_dim,
            reverse,
        })
    }

    /// One LSTM cell update. `projected` is the input projection for this
    /// step, `[batch, 4 * hidden]`.
    fn step(&self, projected: &Tensor, h: &Tensor, c: &Tensor) -> Result<(Tensor, Tensor)> {
        let gates = projected.add(&self.recurrent.forward(h)?)?;
        let chunks = gates.chunk(4, D::Minus1)?;
        let input_gate = sigmoid(&chunks[0])?;
        let forget_gate = sigmoid(&chunks[1])?;
        let candidate = chunks[2].tanh()?;
        let output_gate = sigmoid(&chunks[3])?;

        let c = forget_gate.mul(c)?.add(&input_gate.mul(&candidate)?)?;
        let h = output_gate.mul(&c.tanh()?)?;
        Ok((h, c))
    }

    /// Returns per-position outputs `[batch, seq, hidden]` and the final
    /// hidden state `[batch, hidden]`.
    fn run(&self, xs: &Tensor, mask: &Tensor) -> Result<(Tensor, Tensor)> {
        let (batch, seq_len, _) = xs.dims3()?;
        let projected = self.input.forward(xs)?;

        let mut h = Tensor::zeros((batch, self.hidden_dim), DType::F32, xs.device())?;
        let mut c = h.clone();
        let mut outputs = Vec::with_capacity(seq_len);

        let order: Vec<usize> = if self.reverse {
            (0..seq_len).rev().collect()
        } else {
            (0..seq_len).collect()
        };

        for t in order {
            let step_mask = mask.narrow(1, t, 1)?;
            let step_input = projected.narrow(1, t, 1)?.squeeze(1)?;
            let (h_next, c_next) = self.step(&step_input, &h, &c)?;
            h = masked_update(&h, &h_next, &step_mask)?;
            c = masked_update(&c, &c_next, &step_mask)?;
            outputs.push(h.broadcast_mul(&step_mask)?);
        }

        if self.reverse {
            outputs.reverse();
        }
        Ok((Tensor::stack(&outputs, 1)?, h))
    }
}

struct BiLstmLayer {
    forward: LstmDirection,
    backward: LstmDirection,
}

/// Stacked bidirectional LSTM.
pub struct BiLstmEncoder {
    layers: Vec<BiLstmLayer>,
    dropout: Dropout,
    hidden_dim: usize,
}

impl BiLstmEncoder {
    pub(crate) fn new(
        init: &mut ParamInit<'_>,
        input_dim: usize,
        hidden_dim: usize,
        num_layers: usize,
        dropout: f32,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(num_layers);
        for layer in 0..num_layers {
            let layer_input = if layer == 0 { input_dim } else { 2 * hidden_dim };
            layers.push(BiLstmLayer {
                forward: LstmDirection::new(
                    init,
                    &format!("encoder.l{layer}.fwd"),
                    layer_input,
                    hidden_dim,
                    false,
                )?,
                backward: LstmDirection::new(
                    init,
                    &format!("encoder.l{layer}.bwd"),
                    layer_input,
                    hidden_dim,
                    true,
                )?,
            });
        }

        Ok(Self {
            layers,
            dropout: Dropout::new(dropout),
            hidden_dim,
        })
    }

    /// Width of the per-position and summary states.
    pub fn output_dim(&self) -> usize {
        2 * self.hidden_dim
    }

    /// `xs`: `[batch, seq, input_dim]`, `mask`: `[batch, seq]`.
    ///
    /// Dropout is applied between stacked layers in [`Mode::Train`] only.
    pub fn forward(&self, xs: &Tensor, mask: &Tensor, mode: Mode) -> Result<EncoderOutput> {
        let mut input = xs.clone();
        let mut summary = None;

        for (idx, layer) in self.layers.iter().enumerate() {
            if idx > 0 {
                input = self.dropout.forward(&input, mode.is_train())?;
            }
            let (fwd_states, fwd_last) = layer.forward.run(&input, mask)?;
            let (bwd_states, bwd_last) = layer.backward.run(&input, mask)?;
            input = Tensor::cat(&[&fwd_states, &bwd_states], 2)?;
            summary = Some(Tensor::cat(&[&fwd_last, &bwd_last], 1)?);
        }

        let summary = match summary {
            Some(summary) => summary,
            None => Tensor::zeros((xs.dim(0)?, self.output_dim()), DType::F32, xs.device())?,
        };
        Ok(EncoderOutput {
            states: input,
            summary,
        })
    }
}
