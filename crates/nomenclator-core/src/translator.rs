//! # Translator
//!
//! Inference façade: free-text structure names in, ranked standardized
//! names out. Input is encoded with the translator's own vocabulary and
//! run through the classifier in [`Mode::Eval`], so repeated calls on the
//! same input always return the same ranking.

use std::path::Path;

use candle_core::{D, Device};
use candle_nn::ops::softmax;
use tracing::debug;

use crate::bundle::{ModelBundle, read_bundle, write_bundle};
use crate::encoder::EncodedBatch;
use crate::error::{NomenclatorError, Result};
use crate::model::{Mode, ModelConfig, SequenceClassifier};
use crate::types::Prediction;
use crate::vocab::{LabelSet, Vocabulary};

/// Trained classifier bundled with the vocabulary and labels it was
/// trained against.
pub struct Translator {
    classifier: SequenceClassifier,
    vocabulary: Vocabulary,
    labels: LabelSet,
}

impl Translator {
    /// Pair a classifier with its vocabulary and label set.
    ///
    /// Fails with [`NomenclatorError::InvalidConfig`] when the classifier
    /// output width differs from the label count or its embedding table
    /// cannot index every vocabulary token.
    pub fn new(
        classifier: SequenceClassifier,
        vocabulary: Vocabulary,
        labels: LabelSet,
    ) -> Result<Self> {
        let config = classifier.config();
        if config.num_labels != labels.len() {
            return Err(NomenclatorError::InvalidConfig(format!(
                "classifier predicts {} labels but the label set has {}",
                config.num_labels,
                labels.len()
            )));
        }
        if config.vocab_size < vocabulary.len() {
            return Err(NomenclatorError::InvalidConfig(format!(
                "embedding has {} rows but the vocabulary has {} tokens",
                config.vocab_size,
                vocabulary.len()
            )));
        }
        Ok(Self {
            classifier,
            vocabulary,
            labels,
        })
    }

    /// Top `top_k` predictions for `text`, most confident first.
    ///
    /// `top_k` is clamped to `1..=labels.len()`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nomenclator_core::Translator;
    ///
    /// let translator = Translator::load("models/nomenclator.safetensors").unwrap();
    /// let best = &translator.predict("left parotid", 1).unwrap()[0];
    /// println!("{best}");
    /// ```
    pub fn predict(&self, text: &str, top_k: usize) -> Result<Vec<Prediction>> {
        Ok(self.predict_batch(&[text], top_k)?.pop().unwrap_or_default())
    }

    /// [`Translator::predict`] for many inputs in one forward pass.
    ///
    /// Results line up with `texts`. An empty input yields an empty output.
    pub fn predict_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        top_k: usize,
    ) -> Result<Vec<Vec<Prediction>>> {
        let rows = self.batch_probabilities(texts)?;
        Ok(rows
            .iter()
            .map(|probs| {
                rank_top_k(probs, top_k)
                    .into_iter()
                    .filter_map(|(idx, p)| {
                        self.labels.name(idx).map(|name| Prediction::new(name, p))
                    })
                    .collect()
            })
            .collect())
    }

    /// Full probability distribution over labels for `text`, in label
    /// index order.
    pub fn probabilities(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.batch_probabilities(&[text])?.pop().unwrap_or_default())
    }

    /// Attention weights over the characters of `text`, one per encoded
    /// position. `None` when the classifier runs without attention.
    pub fn attention(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let max_length = self.classifier.config().max_length;
        let batch = EncodedBatch::from_texts(&self.vocabulary, &[text], max_length);
        let output = self.classifier.forward_batch(&batch, Mode::Eval)?;
        match output.attention {
            Some(weights) => Ok(weights.to_vec2::<f32>()?.pop()),
            None => Ok(None),
        }
    }

    fn batch_probabilities<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let max_length = self.classifier.config().max_length;
        let batch = EncodedBatch::from_texts(&self.vocabulary, texts, max_length);
        debug!("Translating batch of {} names", batch.len());

        let output = self.classifier.forward_batch(&batch, Mode::Eval)?;
        let probs = softmax(&output.logits, D::Minus1)?;
        Ok(probs.to_vec2::<f32>()?)
    }

    /// Write this translator as a single bundle file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_bundle(path, &self.classifier, &self.vocabulary, &self.labels)
    }

    /// Load a bundle onto the CPU.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_on(path, &Device::Cpu)
    }

    /// Load a bundle onto `device`.
    pub fn load_on(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let ModelBundle {
            classifier,
            vocabulary,
            labels,
        } = read_bundle(path, device)?;
        Self::new(classifier, vocabulary, labels)
    }

    /// Independent copy. Later changes to either side leave the other
    /// untouched.
    pub fn snapshot(&self) -> Result<Self> {
        Ok(Self {
            classifier: self.classifier.snapshot()?,
            vocabulary: self.vocabulary.clone(),
            labels: self.labels.clone(),
        })
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn config(&self) -> &ModelConfig {
        self.classifier.config()
    }

    pub fn classifier(&self) -> &SequenceClassifier {
        &self.classifier
    }
}

/// Indices and probabilities of the `k` largest entries, largest first.
///
/// Equal probabilities keep ascending index order. `k` is clamped to
/// `1..=probs.len()`.
pub fn rank_top_k(probs: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]).then(a.cmp(&b)));
    order.truncate(k.max(1));
    order.into_iter().map(|idx| (idx, probs[idx])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_LENGTH: usize = 24;

    fn untrained(labels: LabelSet, seed: u64) -> Translator {
        let vocabulary = Vocabulary::new();
        let config = ModelConfig::new(labels.len(), vocabulary.len())
            .with_embedding_dim(8)
            .with_hidden_dim(16)
            .with_num_layers(1)
            .with_max_length(MAX_LENGTH);
        let classifier = SequenceClassifier::new(config, seed, &Device::Cpu).unwrap();
        Translator::new(classifier, vocabulary, labels).unwrap()
    }

    fn standard() -> Translator {
        untrained(LabelSet::standard(), 13)
    }

    #[test]
    fn test_rank_top_k_orders_and_breaks_ties_by_index() {
        let ranked = rank_top_k(&[0.1, 0.3, 0.3, 0.05, 0.25], 4);
        assert_eq!(ranked, vec![(1, 0.3), (2, 0.3), (4, 0.25), (0, 0.1)]);
    }

    #[test]
    fn test_rank_top_k_clamps() {
        assert_eq!(rank_top_k(&[0.2, 0.8], 0), vec![(1, 0.8)]);
        assert_eq!(rank_top_k(&[0.2, 0.8], 10).len(), 2);
        assert!(rank_top_k(&[], 3).is_empty());
    }

    #[test]
    fn test_predict_shape_and_order() {
        let translator = standard();
        for k in [1, 3, 5, 47, 100] {
            let predictions = translator.predict("left parotid", k).unwrap();
            assert_eq!(predictions.len(), k.min(47));
            for pair in predictions.windows(2) {
                assert!(pair[0].confidence >= pair[1].confidence);
            }
            for p in &predictions {
                assert!((0.0..=1.0).contains(&p.confidence));
                assert!(translator.labels().index_of(&p.label).is_some());
            }
        }
    }

    #[test]
    fn test_top_k_zero_returns_best() {
        let translator = standard();
        let predictions = translator.predict("heart", 0).unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions, translator.predict("heart", 1).unwrap());
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let translator = standard();
        let texts = [
            "Parotid_L",
            "",
            "x",
            "a very long structure name that exceeds the maximum length",
        ];
        for text in texts {
            let probs = translator.probabilities(text).unwrap();
            assert_eq!(probs.len(), 47);
            let total: f32 = probs.iter().sum();
            assert!((total - 1.0).abs() < 1e-4, "{text:?} sums to {total}");
        }
    }

    #[test]
    fn test_predict_is_deterministic() {
        let translator = standard();
        let a = translator.predict("spinal cord", 5).unwrap();
        let b = translator.predict("spinal cord", 5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_case_insensitive_input() {
        let translator = standard();
        assert_eq!(
            translator.probabilities("RIGHT LUNG").unwrap(),
            translator.probabilities("right lung").unwrap()
        );
    }

    #[test]
    fn test_empty_string_has_low_confidence() {
        let translator = standard();
        let best = &translator.predict("", 1).unwrap()[0];
        assert!(best.confidence < 0.3);
        assert!(best.needs_review(0.7));
    }

    #[test]
    fn test_batch_matches_single() {
        let translator = standard();
        let texts = ["Lt Lens", "bladder", "", "GTV primary"];
        let batched = translator.predict_batch(&texts, 3).unwrap();
        assert_eq!(batched.len(), texts.len());

        for (text, row) in texts.iter().zip(&batched) {
            let single = translator.predict(text, 3).unwrap();
            assert_eq!(single.len(), row.len());
            for (a, b) in single.iter().zip(row) {
                assert_eq!(a.label, b.label);
                assert!((a.confidence - b.confidence).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_empty_batch() {
        let translator = standard();
        let texts: [&str; 0] = [];
        assert!(translator.predict_batch(&texts, 3).unwrap().is_empty());
    }

    #[test]
    fn test_attention_weights() {
        let translator = standard();
        let weights = translator.attention("heart").unwrap().unwrap();
        assert_eq!(weights.len(), MAX_LENGTH);
        let total: f32 = weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(weights[5..].iter().all(|w| *w == 0.0));
    }

    #[test]
    fn test_rejects_mismatched_labels() {
        let vocabulary = Vocabulary::new();
        let config = ModelConfig::new(3, vocabulary.len()).with_hidden_dim(8);
        let classifier = SequenceClassifier::new(config, 0, &Device::Cpu).unwrap();
        let labels = LabelSet::new(["Heart", "Liver"]).unwrap();
        assert!(matches!(
            Translator::new(classifier, vocabulary, labels),
            Err(NomenclatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_small_embedding_table() {
        let vocabulary = Vocabulary::new();
        let config = ModelConfig::new(2, vocabulary.len() - 1).with_hidden_dim(8);
        let classifier = SequenceClassifier::new(config, 0, &Device::Cpu).unwrap();
        let labels = LabelSet::new(["Heart", "Liver"]).unwrap();
        assert!(Translator::new(classifier, vocabulary, labels).is_err());
    }

    #[test]
    fn test_save_load_preserves_predictions() {
        let translator = untrained(LabelSet::new(["Heart", "Lung_L", "Lung_R"]).unwrap(), 2);
        let path = std::env::temp_dir().join(format!(
            "nomenclator-{}-translator.safetensors",
            std::process::id()
        ));
        translator.save(&path).unwrap();
        let loaded = Translator::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.labels(), translator.labels());
        assert_eq!(loaded.config(), translator.config());
        for text in ["left lung", "cor", ""] {
            assert_eq!(
                loaded.probabilities(text).unwrap(),
                translator.probabilities(text).unwrap()
            );
        }
    }

    #[test]
    fn test_snapshot_is_independent() {
        let translator = standard();
        let copy = translator.snapshot().unwrap();
        let before = copy.probabilities("brainstem").unwrap();

        for var in translator.classifier().vars() {
            var.set(&var.as_tensor().ones_like().unwrap()).unwrap();
        }
        assert_eq!(copy.probabilities("brainstem").unwrap(), before);
    }

    #[test]
    fn test_translator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Translator>();
    }
}
