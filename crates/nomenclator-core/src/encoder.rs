//! # String Encoder
//!
//! Turns raw structure names into fixed-length index sequences plus their
//! true length. Encoding is pure: the same input always produces the same
//! output, whatever was encoded before.

use candle_core::{Device, Tensor};

use crate::error::Result;
use crate::vocab::{PAD_INDEX, Vocabulary};

/// A padded index sequence and the number of real characters in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedText {
    /// Vocabulary indices, always `max_length` long.
    pub ids: Vec<u32>,
    /// Character count before padding, capped at `max_length`.
    pub length: usize,
}

/// Encode `text` into exactly `max_length` indices.
///
/// ASCII letters are lower-cased, the text is truncated to `max_length`
/// characters, unmapped characters become `<UNK>` and the tail is filled
/// with `<PAD>`.
///
/// # Examples
/// ```
/// use nomenclator_core::encoder::encode;
/// use nomenclator_core::vocab::Vocabulary;
///
/// let vocab = Vocabulary::new();
/// let encoded = encode(&vocab, "Lt Parotid", 16);
/// assert_eq!(encoded.ids.len(), 16);
/// assert_eq!(encoded.length, 10);
/// ```
pub fn encode(vocab: &Vocabulary, text: &str, max_length: usize) -> EncodedText {
    let mut ids: Vec<u32> = text
        .chars()
        .take(max_length)
        .map(|c| vocab.index_of(c.to_ascii_lowercase()))
        .collect();
    let length = ids.len();
    ids.resize(max_length, PAD_INDEX);

    EncodedText { ids, length }
}

/// Row-major `[batch, max_length]` mask with 1.0 on real characters and
/// 0.0 on padding.
pub fn length_mask(lengths: &[usize], max_length: usize) -> Vec<f32> {
    let mut mask = vec![0.0f32; lengths.len() * max_length];
    for (row, &len) in lengths.iter().enumerate() {
        let start = row * max_length;
        for value in &mut mask[start..start + len.min(max_length)] {
            *value = 1.0;
        }
    }
    mask
}

/// Several encoded texts stacked into one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    ids: Vec<u32>,
    lengths: Vec<usize>,
    max_length: usize,
}

impl EncodedBatch {
    pub fn new(max_length: usize) -> Self {
        Self {
            ids: Vec::new(),
            lengths: Vec::new(),
            max_length,
        }
    }

    /// Encode every text independently and stack the results.
    pub fn from_texts<S: AsRef<str>>(vocab: &Vocabulary, texts: &[S], max_length: usize) -> Self {
        let mut batch = Self::new(max_length);
        for text in texts {
            batch.push(&encode(vocab, text.as_ref(), max_length));
        }
        batch
    }

    /// Append one row. Rows of a different width are re-padded or cut to
    /// the batch width.
    pub fn push(&mut self, encoded: &EncodedText) {
        let width = self.max_length;
        self.ids
            .extend(encoded.ids.iter().copied().chain(std::iter::repeat(PAD_INDEX)).take(width));
        self.lengths.push(encoded.length.min(width));
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Index tensor `[batch, max_length]` (u32) and mask tensor
    /// `[batch, max_length]` (f32).
    pub fn to_tensors(&self, device: &Device) -> Result<(Tensor, Tensor)> {
        let shape = (self.len(), self.max_length);
        let ids = Tensor::from_vec(self.ids.clone(), shape, device)?;
        let mask = Tensor::from_vec(length_mask(&self.lengths, self.max_length), shape, device)?;
        Ok((ids, mask))
    }
}
