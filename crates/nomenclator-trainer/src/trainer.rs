//! Training loop for the sequence classifier.
//!
//! Epochs run strictly in order; each one makes a shuffled pass over the
//! training split, then measures the validation split in eval mode. The
//! learning-rate plateau schedule and early stopping watch validation
//! loss independently of each other.

use std::collections::HashMap;

use candle_core::{D, DType, Device, Tensor};
use candle_nn::loss::cross_entropy;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use nomenclator_core::bundle::write_bundle;
use nomenclator_core::{
    EncodedExample, LabelSet, Mode, NomenclatorError, Result, SequenceClassifier,
    TrainingExample, Translator, Vocabulary,
};
use oorandom::Rand32;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TrainingConfig;
use crate::data::{Batch, encode_examples, make_batches, split_validation};
use crate::synthetic::SyntheticDataGenerator;

/// Why training stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    Converged,
    EarlyStopped,
    MaxEpochsReached,
}

/// Loss and accuracy over one pass of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub loss: f32,
    pub accuracy: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based.
    pub epoch: usize,
    pub train: Metrics,
    pub validation: Metrics,
    /// Rate used during this epoch.
    pub learning_rate: f64,
}

/// Per-epoch metrics plus the reason training ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
    pub termination: Termination,
    /// Epoch with the lowest validation loss, if any improved at all.
    pub best_epoch: Option<usize>,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }

    pub fn best(&self) -> Option<&EpochRecord> {
        self.best_epoch
            .and_then(|epoch| self.epochs.iter().find(|r| r.epoch == epoch))
    }

    pub fn validation_losses(&self) -> Vec<f32> {
        self.epochs.iter().map(|r| r.validation.loss).collect()
    }
}

/// Multiplies the learning rate by `factor` once validation loss has
/// failed to improve for `patience` epochs in a row.
#[derive(Debug, Clone)]
pub struct PlateauSchedule {
    factor: f64,
    patience: usize,
    min_lr: f64,
    best: f32,
    stalled: usize,
}

impl PlateauSchedule {
    pub fn new(factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            factor,
            patience,
            min_lr,
            best: f32::INFINITY,
            stalled: 0,
        }
    }

    /// Record one epoch. Returns the new rate when it changes.
    pub fn step(&mut self, val_loss: f32, lr: f64) -> Option<f64> {
        if val_loss < self.best {
            self.best = val_loss;
            self.stalled = 0;
            return None;
        }
        self.stalled += 1;
        if self.stalled < self.patience {
            return None;
        }
        self.stalled = 0;
        let decayed = (lr * self.factor).max(self.min_lr);
        (decayed < lr).then_some(decayed)
    }
}

/// Signals a stop after `patience` epochs without improvement.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: f32,
    stalled: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f32::INFINITY,
            stalled: 0,
        }
    }

    /// Record one epoch. Returns `true` if `val_loss` is a new best.
    pub fn update(&mut self, val_loss: f32) -> bool {
        if val_loss < self.best {
            self.best = val_loss;
            self.stalled = 0;
            true
        } else {
            self.stalled += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.stalled >= self.patience
    }

    pub fn best(&self) -> f32 {
        self.best
    }
}

pub struct Trainer {
    classifier: SequenceClassifier,
    vocabulary: Vocabulary,
    labels: LabelSet,
    config: TrainingConfig,
    optimizer: AdamW,
    rng: Rand32,
}

impl Trainer {
    /// Fresh classifier sized for `vocabulary` and `labels`.
    pub fn new(
        config: TrainingConfig,
        vocabulary: Vocabulary,
        labels: LabelSet,
        device: &Device,
    ) -> Result<Self> {
        config.validate()?;
        let model_config = config.model_config(&vocabulary, &labels)?;
        let classifier = SequenceClassifier::new(model_config, config.seed, device)?;
        info!("Model parameters: {}", classifier.parameter_count());

        // Plain Adam updates, no weight decay.
        let params = ParamsAdamW {
            lr: config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let optimizer = AdamW::new(classifier.vars(), params)?;
        let rng = Rand32::new(config.seed);

        Ok(Self {
            classifier,
            vocabulary,
            labels,
            config,
            optimizer,
            rng,
        })
    }

    pub fn classifier(&self) -> &SequenceClassifier {
        &self.classifier
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    /// Encode `examples` against this trainer's vocabulary and labels.
    pub fn prepare(&self, examples: &[TrainingExample]) -> Result<Vec<EncodedExample>> {
        encode_examples(
            examples,
            &self.vocabulary,
            &self.labels,
            self.config.max_length,
        )
    }

    /// Encode, split and train on raw examples.
    ///
    /// Every label is checked before the first epoch starts.
    pub fn fit(&mut self, examples: &[TrainingExample]) -> Result<TrainingHistory> {
        let encoded = self.prepare(examples)?;
        let (train, validation) = split_validation(encoded, self.config.validation_split);
        info!(
            "Train size: {}, Val size: {}",
            train.len(),
            validation.len()
        );
        self.fit_encoded(&train, &validation)
    }

    /// Train until convergence, early stopping or `epochs`.
    ///
    /// An empty `validation` set is replaced by an eval-mode pass over
    /// `train`.
    pub fn fit_encoded(
        &mut self,
        train: &[EncodedExample],
        validation: &[EncodedExample],
    ) -> Result<TrainingHistory> {
        if train.is_empty() {
            return Err(NomenclatorError::InvalidConfig(
                "no training examples".into(),
            ));
        }
        let validation = if validation.is_empty() {
            train
        } else {
            validation
        };

        let mut schedule = PlateauSchedule::new(
            self.config.lr_decay_factor,
            self.config.lr_patience,
            self.config.min_learning_rate,
        );
        let mut stopping = EarlyStopping::new(self.config.patience);
        let mut best_state: Option<HashMap<String, Tensor>> = None;
        let mut history = TrainingHistory {
            epochs: Vec::new(),
            termination: Termination::MaxEpochsReached,
            best_epoch: None,
        };

        for epoch in 1..=self.config.epochs {
            let learning_rate = self.learning_rate();
            let train_metrics = self.train_epoch(train)?;
            let val_metrics = self.evaluate(validation)?;

            info!(
                "Epoch {}/{} - train loss {:.4} acc {:.4} | val loss {:.4} acc {:.4} | lr {:.2e}",
                epoch,
                self.config.epochs,
                train_metrics.loss,
                train_metrics.accuracy,
                val_metrics.loss,
                val_metrics.accuracy,
                learning_rate
            );
            if !val_metrics.loss.is_finite() {
                warn!("Validation loss is {} at epoch {}", val_metrics.loss, epoch);
            }
            history.epochs.push(EpochRecord {
                epoch,
                train: train_metrics,
                validation: val_metrics,
                learning_rate,
            });

            if stopping.update(val_metrics.loss) {
                history.best_epoch = Some(epoch);
                best_state = Some(self.classifier.export_parameters()?);
                self.checkpoint()?;
            }

            if let Some(target) = self.config.convergence_loss {
                if val_metrics.loss <= target {
                    info!("Converged at epoch {} (val loss {:.4})", epoch, val_metrics.loss);
                    history.termination = Termination::Converged;
                    break;
                }
            }
            if stopping.should_stop() {
                info!("Early stopping triggered after epoch {}", epoch);
                history.termination = Termination::EarlyStopped;
                break;
            }
            if let Some(lr) = schedule.step(val_metrics.loss, learning_rate) {
                info!("Reducing learning rate to {:.2e}", lr);
                self.optimizer.set_learning_rate(lr);
            }
        }

        if self.config.restore_best {
            if let (Some(state), Some(epoch)) = (&best_state, history.best_epoch) {
                debug!("Restoring parameters from epoch {}", epoch);
                self.classifier.import_parameters(state)?;
            }
        }
        Ok(history)
    }

    /// One shuffled pass with parameter updates.
    pub fn train_epoch(&mut self, examples: &[EncodedExample]) -> Result<Metrics> {
        let batches = make_batches(
            examples,
            self.config.batch_size,
            self.config.max_length,
            Some(&mut self.rng),
        );

        let mut tally = Tally::default();
        for batch in &batches {
            let (loss, logits, targets) = self.batch_loss(batch, Mode::Train)?;
            self.optimizer.backward_step(&loss)?;
            tally.add(&loss, &logits, &targets, batch.len())?;
        }
        Ok(tally.metrics())
    }

    /// Loss and accuracy in eval mode, without parameter updates.
    pub fn evaluate(&self, examples: &[EncodedExample]) -> Result<Metrics> {
        let batches = make_batches(
            examples,
            self.config.batch_size,
            self.config.max_length,
            None,
        );

        let mut tally = Tally::default();
        for batch in &batches {
            let (loss, logits, targets) = self.batch_loss(batch, Mode::Eval)?;
            tally.add(&loss, &logits, &targets, batch.len())?;
        }
        Ok(tally.metrics())
    }

    fn batch_loss(&self, batch: &Batch, mode: Mode) -> Result<(Tensor, Tensor, Tensor)> {
        let device = self.classifier.device();
        let output = self.classifier.forward_batch(&batch.inputs, mode)?;
        let targets = batch.target_tensor(device)?;
        let loss = cross_entropy(&output.logits, &targets)?;
        Ok((loss, output.logits, targets))
    }

    fn checkpoint(&self) -> Result<()> {
        if let Some(path) = &self.config.checkpoint_path {
            write_bundle(path, &self.classifier, &self.vocabulary, &self.labels)?;
            debug!("Checkpoint written to {:?}", path);
        }
        Ok(())
    }

    /// Wrap the trained classifier for inference.
    pub fn into_translator(self) -> Result<Translator> {
        Translator::new(self.classifier, self.vocabulary, self.labels)
    }
}

#[derive(Default)]
struct Tally {
    loss_sum: f32,
    correct: f32,
    total: usize,
}

impl Tally {
    fn add(&mut self, loss: &Tensor, logits: &Tensor, targets: &Tensor, len: usize) -> Result<()> {
        self.loss_sum += loss.to_scalar::<f32>()? * len as f32;
        self.correct += logits
            .argmax(D::Minus1)?
            .eq(targets)?
            .to_dtype(DType::F32)?
            .sum_all()?
            .to_scalar::<f32>()?;
        self.total += len;
        Ok(())
    }

    fn metrics(&self) -> Metrics {
        if self.total == 0 {
            return Metrics {
                loss: 0.0,
                accuracy: 0.0,
            };
        }
        Metrics {
            loss: self.loss_sum / self.total as f32,
            accuracy: self.correct / self.total as f32,
        }
    }
}

/// A trained translator and how it got there.
pub struct TrainingOutcome {
    pub translator: Translator,
    pub history: TrainingHistory,
}

/// Generate synthetic data for the standard label set and train on it.
pub fn run_training(config: &TrainingConfig, device: &Device) -> Result<TrainingOutcome> {
    config.validate()?;
    let vocabulary = Vocabulary::new();
    let labels = LabelSet::standard();
    info!(
        "Vocabulary size: {}, number of classes: {}",
        vocabulary.len(),
        labels.len()
    );

    let dataset = SyntheticDataGenerator::for_labels(&labels, config.seed)
        .generate_dataset(&labels, config.variations_per_name)?;

    let mut trainer = Trainer::new(config.clone(), vocabulary, labels, device)?;
    let history = trainer.fit(&dataset)?;
    info!(
        "Training finished after {} epochs ({:?})",
        history.epochs.len(),
        history.termination
    );

    Ok(TrainingOutcome {
        translator: trainer.into_translator()?,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact_names_config() -> TrainingConfig {
        TrainingConfig::default()
            .with_embedding_dim(16)
            .with_hidden_dim(32)
            .with_num_layers(1)
            .with_dropout(0.0)
            .with_max_length(16)
            .with_learning_rate(0.01)
            .with_batch_size(8)
            .with_epochs(300)
            .with_patience(1000)
            .with_lr_schedule(0.5, 1000)
            .with_convergence_loss(Some(0.01))
            .with_validation_split(0.0)
            .with_seed(7)
    }

    #[test]
    fn test_plateau_schedule() {
        let mut schedule = PlateauSchedule::new(0.5, 2, 0.0);
        assert_eq!(schedule.step(1.0, 0.1), None);
        assert_eq!(schedule.step(1.1, 0.1), None);
        assert_eq!(schedule.step(1.0, 0.1), Some(0.05));
        // Counter restarts after a decay.
        assert_eq!(schedule.step(1.2, 0.05), None);
        assert_eq!(schedule.step(0.5, 0.05), None);
        assert_eq!(schedule.step(0.6, 0.05), None);
        assert_eq!(schedule.step(0.6, 0.05), Some(0.025));
    }

    #[test]
    fn test_plateau_schedule_respects_floor() {
        let mut schedule = PlateauSchedule::new(0.1, 1, 0.05);
        schedule.step(1.0, 0.1);
        assert_eq!(schedule.step(2.0, 0.1), Some(0.05));
        assert_eq!(schedule.step(2.0, 0.05), None);
    }

    #[test]
    fn test_early_stopping() {
        let mut stopping = EarlyStopping::new(3);
        assert!(stopping.update(1.0));
        assert!(!stopping.update(1.0));
        assert!(!stopping.update(1.5));
        assert!(!stopping.should_stop());
        assert!(stopping.update(0.9));
        for _ in 0..3 {
            assert!(!stopping.update(f32::NAN));
        }
        assert!(stopping.should_stop());
        assert_eq!(stopping.best(), 0.9);
    }

    #[test]
    fn test_unknown_label_fails_before_training() {
        let config = exact_names_config().with_epochs(1);
        let mut trainer =
            Trainer::new(config, Vocabulary::new(), LabelSet::standard(), &Device::Cpu).unwrap();
        let examples = vec![
            TrainingExample::new("heart", "Heart"),
            TrainingExample::new("pancreas", "Pancreas"),
        ];
        let err = trainer.fit(&examples).unwrap_err();
        assert!(matches!(err, NomenclatorError::UnknownLabel { label } if label == "Pancreas"));
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        let mut trainer = Trainer::new(
            exact_names_config(),
            Vocabulary::new(),
            LabelSet::standard(),
            &Device::Cpu,
        )
        .unwrap();
        assert!(trainer.fit(&[]).is_err());
    }

    #[test]
    fn test_early_stopping_ends_run() {
        let labels = LabelSet::new(["Heart", "Liver"]).unwrap();
        let config = exact_names_config()
            .with_epochs(50)
            .with_patience(2)
            .with_convergence_loss(None)
            .with_learning_rate(1e-12);
        let mut trainer = Trainer::new(config, Vocabulary::new(), labels, &Device::Cpu).unwrap();
        let examples = vec![
            TrainingExample::new("Heart", "Heart"),
            TrainingExample::new("Liver", "Liver"),
        ];
        let history = trainer.fit(&examples).unwrap();
        assert!(history.epochs.len() < 50);
        assert_eq!(history.termination, Termination::EarlyStopped);
        assert!(history.best().is_some());
    }

    #[test]
    fn test_memorizes_standard_names() {
        let labels = LabelSet::standard();
        let examples: Vec<TrainingExample> = labels
            .names()
            .iter()
            .map(|name| TrainingExample::new(name.as_str(), name.as_str()))
            .collect();

        let mut trainer =
            Trainer::new(exact_names_config(), Vocabulary::new(), labels, &Device::Cpu).unwrap();
        let history = trainer.fit(&examples).unwrap();
        assert!(!history.epochs.is_empty());

        let encoded = trainer.prepare(&examples).unwrap();
        let metrics = trainer.evaluate(&encoded).unwrap();
        assert!(metrics.accuracy >= 0.99, "accuracy {}", metrics.accuracy);

        let translator = trainer.into_translator().unwrap();
        assert_eq!(translator.predict("Parotid_L", 1).unwrap()[0].label, "Parotid_L");

        let empty = &translator.predict("", 1).unwrap()[0];
        assert!(empty.confidence < 0.3, "empty input confidence {}", empty.confidence);
    }

    #[test]
    fn test_padding_embedding_row_stays_zero() {
        let labels = LabelSet::new(["Heart", "Liver", "Parotid_L", "Parotid_R"]).unwrap();
        let examples = SyntheticDataGenerator::for_labels(&labels, 1)
            .generate_dataset(&labels, 5)
            .unwrap();
        let config = exact_names_config()
            .with_epochs(3)
            .with_dropout(0.3)
            .with_convergence_loss(None);
        let mut trainer = Trainer::new(config, Vocabulary::new(), labels, &Device::Cpu).unwrap();
        let history = trainer.fit(&examples).unwrap();
        assert_eq!(history.epochs.len(), 3);

        let params = trainer.classifier().export_parameters().unwrap();
        let padding_row = params["embedding.weight"].get(0).unwrap().to_vec1::<f32>().unwrap();
        assert!(padding_row.iter().all(|&w| w == 0.0), "{padding_row:?}");
    }

    #[test]
    fn test_learning_rate_decays_on_plateau() {
        let labels = LabelSet::new(["Heart", "Liver"]).unwrap();
        let config = exact_names_config()
            .with_epochs(10)
            .with_learning_rate(1e-12)
            .with_lr_schedule(0.5, 2)
            .with_patience(100)
            .with_convergence_loss(None);
        let mut trainer = Trainer::new(config, Vocabulary::new(), labels, &Device::Cpu).unwrap();
        let examples = vec![
            TrainingExample::new("Heart", "Heart"),
            TrainingExample::new("Liver", "Liver"),
        ];
        let history = trainer.fit(&examples).unwrap();

        assert_eq!(history.termination, Termination::MaxEpochsReached);
        let rates: Vec<f64> = history.epochs.iter().map(|e| e.learning_rate).collect();
        assert_eq!(
            rates,
            vec![
                1e-12, 1e-12, 1e-12, 5e-13, 5e-13, 2.5e-13, 2.5e-13, 1.25e-13, 1.25e-13, 6.25e-14,
            ]
        );
        assert_eq!(trainer.learning_rate(), 6.25e-14);
    }

    #[test]
    fn test_checkpoint_written_on_improvement() {
        let path = std::env::temp_dir().join(format!(
            "nomenclator-{}-checkpoint.safetensors",
            std::process::id()
        ));
        let labels = LabelSet::new(["Heart", "Liver"]).unwrap();
        let config = exact_names_config()
            .with_epochs(2)
            .with_checkpoint_path(Some(path.clone()));
        let mut trainer = Trainer::new(config, Vocabulary::new(), labels, &Device::Cpu).unwrap();
        let examples = vec![
            TrainingExample::new("Heart", "Heart"),
            TrainingExample::new("Liver", "Liver"),
        ];
        trainer.fit(&examples).unwrap();

        let restored = Translator::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(restored.labels().len(), 2);
    }

    #[test]
    fn test_history_serializes() {
        let history = TrainingHistory {
            epochs: vec![EpochRecord {
                epoch: 1,
                train: Metrics { loss: 1.5, accuracy: 0.25 },
                validation: Metrics { loss: 1.4, accuracy: 0.3 },
                learning_rate: 1e-3,
            }],
            termination: Termination::MaxEpochsReached,
            best_epoch: Some(1),
        };
        let json = serde_json::to_string(&history).unwrap();
        let back: TrainingHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
        assert_eq!(back.validation_losses(), vec![1.4]);
    }

    #[test]
    #[ignore = "full training run"]
    fn test_left_parotid_after_full_training() {
        let outcome = run_training(&TrainingConfig::default(), &Device::Cpu).unwrap();
        let best = &outcome.translator.predict("left parotid", 1).unwrap()[0];
        assert_eq!(best.label, "Parotid_L");
        assert!(best.confidence > 0.5);
    }
}
