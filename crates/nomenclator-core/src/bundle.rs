//! # Model Bundle
//!
//! A bundle is one safetensors file. Tensor entries hold the named
//! classifier parameters; the `nomenclator.bundle` metadata entry holds a
//! versioned JSON header with the architecture, the character vocabulary
//! and the label map, both directions each. Nothing outside the file is
//! needed to rebuild a working translator.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use candle_core::Device;
use safetensors::SafeTensors;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{NomenclatorError, Result};
use crate::model::{ModelConfig, SequenceClassifier};
use crate::vocab::{LabelSet, Vocabulary};

/// Schema version written by this build.
pub const BUNDLE_SCHEMA_VERSION: u32 = 1;

/// Metadata key carrying the JSON header.
pub const HEADER_KEY: &str = "nomenclator.bundle";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BundleHeader {
    schema_version: u32,
    model: ModelConfig,
    vocabulary: VocabularyRecord,
    labels: LabelRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VocabularyRecord {
    tokens: Vec<String>,
    token_to_index: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LabelRecord {
    names: Vec<String>,
    name_to_index: BTreeMap<String, usize>,
}

/// Everything needed to serve predictions.
pub struct ModelBundle {
    pub classifier: SequenceClassifier,
    pub vocabulary: Vocabulary,
    pub labels: LabelSet,
}

/// Write `classifier`, `vocabulary` and `labels` to `path`.
pub fn write_bundle(
    path: impl AsRef<Path>,
    classifier: &SequenceClassifier,
    vocabulary: &Vocabulary,
    labels: &LabelSet,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let header = BundleHeader {
        schema_version: BUNDLE_SCHEMA_VERSION,
        model: classifier.config().clone(),
        vocabulary: VocabularyRecord {
            tokens: vocabulary.tokens().to_vec(),
            token_to_index: index_map(vocabulary.tokens()),
        },
        labels: LabelRecord {
            names: labels.names().to_vec(),
            name_to_index: index_map(labels.names()),
        },
    };

    let metadata = HashMap::from([(HEADER_KEY.to_string(), serde_json::to_string(&header)?)]);
    let params = classifier.export_parameters()?;
    let count = params.len();
    safetensors::serialize_to_file(params, &Some(metadata), path)?;

    info!("Wrote model bundle with {} tensors to {:?}", count, path);
    Ok(())
}

/// Read a bundle written by [`write_bundle`].
pub fn read_bundle(path: impl AsRef<Path>, device: &Device) -> Result<ModelBundle> {
    let path = path.as_ref();
    let corrupt = |reason: String| NomenclatorError::BundleLoad {
        path: path.to_path_buf(),
        reason,
    };

    let buffer = std::fs::read(path).map_err(|e| corrupt(e.to_string()))?;
    let (_, metadata) = SafeTensors::read_metadata(&buffer).map_err(|e| corrupt(e.to_string()))?;
    let header_json = metadata
        .metadata()
        .as_ref()
        .and_then(|entries| entries.get(HEADER_KEY))
        .ok_or_else(|| corrupt(format!("missing {HEADER_KEY} header")))?;
    let header: BundleHeader =
        serde_json::from_str(header_json).map_err(|e| corrupt(format!("bad header: {e}")))?;

    if header.schema_version != BUNDLE_SCHEMA_VERSION {
        return Err(NomenclatorError::UnsupportedBundleVersion {
            found: header.schema_version,
            expected: BUNDLE_SCHEMA_VERSION,
        });
    }
    debug!("Bundle header: {:?}", header.model);

    check_index_map(&header.vocabulary.tokens, &header.vocabulary.token_to_index)
        .map_err(|reason| corrupt(format!("vocabulary: {reason}")))?;
    check_index_map(&header.labels.names, &header.labels.name_to_index)
        .map_err(|reason| corrupt(format!("labels: {reason}")))?;

    let vocabulary = Vocabulary::from_tokens(header.vocabulary.tokens);
    let labels = LabelSet::new(header.labels.names)?;

    if header.model.num_labels != labels.len() {
        return Err(corrupt(format!(
            "model predicts {} labels but the label map has {}",
            header.model.num_labels,
            labels.len()
        )));
    }
    if header.model.vocab_size < vocabulary.len() {
        return Err(corrupt(format!(
            "embedding has {} rows but the vocabulary has {} tokens",
            header.model.vocab_size,
            vocabulary.len()
        )));
    }

    let tensors = candle_core::safetensors::load_buffer(&buffer, device)
        .map_err(|e| corrupt(e.to_string()))?;
    let classifier = SequenceClassifier::new(header.model, 0, device)?;
    classifier
        .import_parameters(&tensors)
        .map_err(|e| corrupt(e.to_string()))?;

    info!(
        "Loaded model bundle from {:?} ({} labels, {} parameters)",
        path,
        labels.len(),
        classifier.parameter_count()
    );
    Ok(ModelBundle {
        classifier,
        vocabulary,
        labels,
    })
}

fn index_map(items: &[String]) -> BTreeMap<String, usize> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| (item.clone(), idx))
        .collect()
}

/// Both directions of a persisted mapping must describe the same bijection.
fn check_index_map(
    items: &[String],
    reverse: &BTreeMap<String, usize>,
) -> std::result::Result<(), String> {
    if items.len() != reverse.len() {
        return Err(format!(
            "{} entries but {} reverse entries",
            items.len(),
            reverse.len()
        ));
    }
    for (idx, item) in items.iter().enumerate() {
        match reverse.get(item) {
            Some(&found) if found == idx => {}
            Some(&found) => return Err(format!("{item:?} maps to {found}, expected {idx}")),
            None => return Err(format!("{item:?} has no reverse entry")),
        }
    }
    Ok(())
}
