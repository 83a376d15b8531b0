//! Seeded parameter creation.
//!
//! Every learned tensor is registered in the classifier's [`VarMap`] under a
//! stable dotted name, which is also the key used in model bundles.

use candle_core::{Device, Shape, Tensor, Var};
use candle_nn::{Linear, VarMap};
use oorandom::Rand32;

use crate::error::{NomenclatorError, Result};

pub(crate) struct ParamInit<'a> {
    varmap: &'a VarMap,
    rng: Rand32,
    device: &'a Device,
}

impl<'a> ParamInit<'a> {
    pub(crate) fn new(varmap: &'a VarMap, seed: u64, device: &'a Device) -> Self {
        Self {
            varmap,
            rng: Rand32::new(seed),
            device,
        }
    }

    /// Values drawn uniformly from `[-bound, bound)`.
    pub(crate) fn uniform<S: Into<Shape>>(
        &mut self,
        name: &str,
        shape: S,
        bound: f32,
    ) -> Result<Tensor> {
        let shape = shape.into();
        let data: Vec<f32> = (0..shape.elem_count())
            .map(|_| (self.rng.rand_float() * 2.0 - 1.0) * bound)
            .collect();
        self.register(name, Tensor::from_vec(data, shape, self.device)?)
    }

    /// Unit-variance table whose `padding_row` is all zeros.
    pub(crate) fn embedding_table(
        &mut self,
        name: &str,
        rows: usize,
        cols: usize,
        padding_row: usize,
    ) -> Result<Tensor> {
        let bound = 3.0f32.sqrt();
        let mut data: Vec<f32> = (0..rows * cols)
            .map(|_| (self.rng.rand_float() * 2.0 - 1.0) * bound)
            .collect();
        if padding_row < rows {
            data[padding_row * cols..(padding_row + 1) * cols].fill(0.0);
        }
        self.register(name, Tensor::from_vec(data, (rows, cols), self.device)?)
    }

    /// Fully connected layer with fan-in scaled uniform initialisation.
    pub(crate) fn linear(
        &mut self,
        prefix: &str,
        in_dim: usize,
        out_dim: usize,
        with_bias: bool,
    ) -> Result<Linear> {
        let bound = 1.0 / (in_dim as f32).sqrt();
        let weight = self.uniform(&format!("{prefix}.weight"), (out_dim, in_dim), bound)?;
        let bias = if with_bias {
            Some(self.uniform(&format!("{prefix}.bias"), out_dim, bound)?)
        } else {
            None
        };
        Ok(Linear::new(weight, bias))
    }

    fn register(&mut self, name: &str, value: Tensor) -> Result<Tensor> {
        let var = Var::from_tensor(&value)?;
        let tensor = var.as_tensor().clone();
        self.varmap
            .data()
            .lock()
            .map_err(|e| NomenclatorError::ParameterLock(e.to_string()))?
            .insert(name.to_string(), var);
        Ok(tensor)
    }
}
