//! # Sequence Classifier
//!
//! Character embedding -> bidirectional LSTM -> attention pooling ->
//! classification head. Each stage owns only its own parameters and the
//! stages are chained by explicit calls in [`SequenceClassifier::forward`].

use std::collections::HashMap;

use candle_core::{Device, Tensor, Var};
use candle_nn::VarMap;

use super::Mode;
use super::attention::Attention;
use super::config::ModelConfig;
use super::embedding::CharEmbedding;
use super::head::ClassifierHead;
use super::init::ParamInit;
use super::recurrent::BiLstmEncoder;
use crate::encoder::EncodedBatch;
use crate::error::{NomenclatorError, Result};

/// Raw classifier output. No softmax is applied.
#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    /// `[batch, num_labels]`.
    pub logits: Tensor,
    /// `[batch, seq]` attention weights when attention is enabled.
    pub attention: Option<Tensor>,
}

/// Character-level structure name classifier.
pub struct SequenceClassifier {
    config: ModelConfig,
    varmap: VarMap,
    device: Device,
    embedding: CharEmbedding,
    encoder: BiLstmEncoder,
    attention: Option<Attention>,
    head: ClassifierHead,
}

impl SequenceClassifier {
    /// Build a classifier with parameters initialised from `seed`.
    pub fn new(config: ModelConfig, seed: u64, device: &Device) -> Result<Self> {
        config.validate()?;

        let varmap = VarMap::new();
        let mut init = ParamInit::new(&varmap, seed, device);

        let embedding = CharEmbedding::new(&mut init, config.vocab_size, config.embedding_dim)?;
        let encoder = BiLstmEncoder::new(
            &mut init,
            config.embedding_dim,
            config.hidden_dim,
            config.num_layers,
            config.dropout,
        )?;
        let attention = if config.use_attention {
            Some(Attention::new(&mut init, encoder.output_dim())?)
        } else {
            None
        };
        let head = ClassifierHead::new(
            &mut init,
            encoder.output_dim(),
            config.hidden_dim,
            config.num_labels,
            config.dropout,
        )?;

        Ok(Self {
            config,
            varmap,
            device: device.clone(),
            embedding,
            encoder,
            attention,
            head,
        })
    }

    /// `ids`: `[batch, seq]` u32, `mask`: `[batch, seq]` f32 with 1.0 on
    /// real characters.
    pub fn forward(&self, ids: &Tensor, mask: &Tensor, mode: Mode) -> Result<ClassifierOutput> {
        let embedded = self.embedding.forward(ids, mask)?;
        let encoded = self.encoder.forward(&embedded, mask, mode)?;

        let (pooled, attention) = match &self.attention {
            Some(attention) => {
                let (context, weights) = attention.forward(&encoded.states, mask)?;
                (context, Some(weights))
            }
            None => (encoded.summary, None),
        };

        Ok(ClassifierOutput {
            logits: self.head.forward(&pooled, mode)?,
            attention,
        })
    }

    /// Run an [`EncodedBatch`] through [`SequenceClassifier::forward`].
    pub fn forward_batch(&self, batch: &EncodedBatch, mode: Mode) -> Result<ClassifierOutput> {
        let (ids, mask) = batch.to_tensors(&self.device)?;
        self.forward(&ids, &mask, mode)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Trainable variables, for the optimizer.
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Total number of learned scalars.
    pub fn parameter_count(&self) -> usize {
        self.vars().iter().map(|var| var.elem_count()).sum()
    }

    /// Detached copies of every parameter, keyed by name.
    pub fn export_parameters(&self) -> Result<HashMap<String, Tensor>> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|e| NomenclatorError::ParameterLock(e.to_string()))?;
        data.iter()
            .map(|(name, var)| Ok((name.clone(), var.as_tensor().copy()?)))
            .collect()
    }

    /// Overwrite every parameter from `params`.
    ///
    /// Each parameter must be present with its exact shape; extra entries
    /// are ignored.
    pub fn import_parameters(&self, params: &HashMap<String, Tensor>) -> Result<()> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|e| NomenclatorError::ParameterLock(e.to_string()))?;
        for (name, var) in data.iter() {
            let value = params
                .get(name)
                .ok_or_else(|| NomenclatorError::MissingParameter(name.clone()))?;
            if value.dims() != var.dims() {
                return Err(NomenclatorError::InvalidConfig(format!(
                    "parameter {name} has shape {:?}, expected {:?}",
                    value.dims(),
                    var.dims()
                )));
            }
            let value = value.to_dtype(var.dtype())?.to_device(&self.device)?;
            var.set(&value)?;
        }
        Ok(())
    }

    /// Independent copy with its own parameter storage.
    pub fn snapshot(&self) -> Result<Self> {
        let copy = Self::new(self.config.clone(), 0, &self.device)?;
        copy.import_parameters(&self.export_parameters()?)?;
        Ok(copy)
    }
}
