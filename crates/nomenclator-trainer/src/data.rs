//! Dataset preparation: encoding, validation split, seeded shuffling and
//! batching.

use candle_core::{Device, Tensor};
use nomenclator_core::{
    EncodedBatch, EncodedExample, LabelSet, Result, TrainingExample, Vocabulary,
};
use oorandom::Rand32;

/// Fisher-Yates shuffle driven by `rng`.
pub fn shuffle<T>(items: &mut [T], rng: &mut Rand32) {
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..(i as u32 + 1)) as usize;
        items.swap(i, j);
    }
}

/// Encode every example against `vocabulary` and `labels`.
///
/// Fails on the first example whose label is not in `labels`.
pub fn encode_examples(
    examples: &[TrainingExample],
    vocabulary: &Vocabulary,
    labels: &LabelSet,
    max_length: usize,
) -> Result<Vec<EncodedExample>> {
    examples
        .iter()
        .map(|example| example.encode(vocabulary, labels, max_length))
        .collect()
}

/// Split off the leading `fraction` of `items` as the validation set.
///
/// Returns `(train, validation)`.
pub fn split_validation<T>(mut items: Vec<T>, fraction: f32) -> (Vec<T>, Vec<T>) {
    let val_size = ((items.len() as f32 * fraction) as usize).min(items.len());
    let train = items.split_off(val_size);
    (train, items)
}

/// One mini-batch of encoded inputs and their label indices.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: EncodedBatch,
    pub targets: Vec<u32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Label indices as a `[batch]` u32 tensor.
    pub fn target_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_slice(&self.targets, self.targets.len(), device)?)
    }
}

/// Group `examples` into batches of at most `batch_size`.
///
/// With `rng` the order is shuffled first; otherwise input order is kept.
pub fn make_batches(
    examples: &[EncodedExample],
    batch_size: usize,
    max_length: usize,
    rng: Option<&mut Rand32>,
) -> Vec<Batch> {
    let mut order: Vec<usize> = (0..examples.len()).collect();
    if let Some(rng) = rng {
        shuffle(&mut order, rng);
    }

    order
        .chunks(batch_size.max(1))
        .map(|chunk| {
            let mut inputs = EncodedBatch::new(max_length);
            let mut targets = Vec::with_capacity(chunk.len());
            for &idx in chunk {
                inputs.push(&examples[idx].text);
                targets.push(examples[idx].label as u32);
            }
            Batch { inputs, targets }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use nomenclator_core::NomenclatorError;

    use super::*;

    fn examples() -> Vec<EncodedExample> {
        let vocabulary = Vocabulary::new();
        let labels = LabelSet::standard();
        let raw: Vec<TrainingExample> = ["Heart", "Liver", "Bladder", "Rectum", "Brain"]
            .iter()
            .map(|name| TrainingExample::new(name.to_lowercase(), *name))
            .collect();
        encode_examples(&raw, &vocabulary, &labels, 12).unwrap()
    }

    #[test]
    fn test_shuffle_is_seeded_permutation() {
        let mut a: Vec<u32> = (0..20).collect();
        let mut b = a.clone();
        shuffle(&mut a, &mut Rand32::new(7));
        shuffle(&mut b, &mut Rand32::new(7));
        assert_eq!(a, b);
        assert_ne!(a, (0..20).collect::<Vec<_>>());

        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_encode_examples_unknown_label() {
        let raw = vec![
            TrainingExample::new("heart", "Heart"),
            TrainingExample::new("foo", "NotAStructure"),
        ];
        let err = encode_examples(&raw, &Vocabulary::new(), &LabelSet::standard(), 8).unwrap_err();
        assert!(matches!(
            err,
            NomenclatorError::UnknownLabel { label } if label == "NotAStructure"
        ));
    }

    #[test]
    fn test_split_validation_takes_leading_fraction() {
        let (train, val) = split_validation((0..10).collect::<Vec<_>>(), 0.2);
        assert_eq!(val, vec![0, 1]);
        assert_eq!(train, (2..10).collect::<Vec<_>>());

        let (train, val) = split_validation(vec![1, 2, 3], 0.0);
        assert_eq!(train.len(), 3);
        assert!(val.is_empty());
    }

    #[test]
    fn test_make_batches_in_order() {
        let examples = examples();
        let batches = make_batches(&examples, 2, 12, None);
        assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(batches[0].targets, vec![19, 24]);
        assert_eq!(batches[0].inputs.max_length(), 12);
    }

    #[test]
    fn test_make_batches_shuffled_covers_all() {
        let examples = examples();
        let batches = make_batches(&examples, 3, 12, Some(&mut Rand32::new(1)));
        let mut targets: Vec<u32> = batches.iter().flat_map(|b| b.targets.clone()).collect();
        targets.sort();
        let mut expected: Vec<u32> = examples.iter().map(|e| e.label as u32).collect();
        expected.sort();
        assert_eq!(targets, expected);
    }

    #[test]
    fn test_target_tensor() {
        let batch = &make_batches(&examples(), 5, 12, None)[0];
        let tensor = batch.target_tensor(&Device::Cpu).unwrap();
        assert_eq!(tensor.to_vec1::<u32>().unwrap(), batch.targets);
    }
}
