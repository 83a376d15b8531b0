//! # Character Vocabulary and Label Set
//!
//! Fixed, ordered mappings used by the encoder and the classifier head.
//! Both are pure functions of constant lists: building them twice yields
//! identical indices.

use std::collections::HashMap;

use crate::error::{NomenclatorError, Result};

/// Padding token. Always index 0.
pub const PAD_TOKEN: &str = "<PAD>";
/// Out-of-vocabulary token. Always index 1.
pub const UNK_TOKEN: &str = "<UNK>";
/// Sequence start marker.
pub const START_TOKEN: &str = "<START>";
/// Sequence end marker.
pub const END_TOKEN: &str = "<END>";

/// Index of [`PAD_TOKEN`].
pub const PAD_INDEX: u32 = 0;
/// Index of [`UNK_TOKEN`].
pub const UNK_INDEX: u32 = 1;

const RESERVED_TOKENS: &[&str] = &[PAD_TOKEN, UNK_TOKEN, START_TOKEN, END_TOKEN];

const PUNCTUATION: &[char] = &[' ', '_', '-', '(', ')', '[', ']', '.', ',', '/'];

/// TG-263 standardized structure names, in label-index order.
pub const STANDARD_NAMES: &[&str] = &[
    // Brain/CNS
    "Brain",
    "Brainstem",
    "Chiasm",
    "Cochlea_L",
    "Cochlea_R",
    "Lens_L",
    "Lens_R",
    "OpticNrv_L",
    "OpticNrv_R",
    // Head & Neck
    "Parotid_L",
    "Parotid_R",
    "Submand_L",
    "Submand_R",
    "SpinalCord",
    "Esophagus",
    "Larynx",
    "Mandible",
    "BrachialPlex_L",
    "BrachialPlex_R",
    // Thorax
    "Heart",
    "Lung_L",
    "Lung_R",
    "Lungs",
    "Trachea",
    // Abdomen
    "Liver",
    "Stomach",
    "Kidney_L",
    "Kidney_R",
    "Kidneys",
    "Spleen",
    "Bowel_Small",
    "Bowel_Large",
    // Pelvis
    "Bladder",
    "Rectum",
    "FemoralHead_L",
    "FemoralHead_R",
    "Prostate",
    "Uterus",
    "PenileBulb",
    // Spine
    "SpinalCanal",
    "Cauda",
    // Targets
    "GTV",
    "CTV",
    "PTV",
    "ITV",
    // Other
    "Body",
    "BoneMarrow",
];

/// Character-to-index vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    tokens: Vec<String>,
    char_to_idx: HashMap<char, u32>,
}

impl Vocabulary {
    /// Build the default vocabulary: reserved tokens, `a`-`z`, `0`-`9`
    /// and a small punctuation set.
    pub fn new() -> Self {
        let mut tokens: Vec<String> = RESERVED_TOKENS.iter().map(|t| t.to_string()).collect();
        tokens.extend(('a'..='z').map(String::from));
        tokens.extend(('0'..='9').map(String::from));
        tokens.extend(PUNCTUATION.iter().map(|c| c.to_string()));

        Self::from_tokens(tokens)
    }

    /// Rebuild a vocabulary from its index-ordered token list.
    ///
    /// Single-character tokens become encodable characters; multi-character
    /// tokens (the reserved markers) are only reachable by index.
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let char_to_idx = tokens
            .iter()
            .enumerate()
            .filter_map(|(idx, token)| {
                let mut chars = token.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some((c, idx as u32)),
                    _ => None,
                }
            })
            .collect();

        Self {
            tokens,
            char_to_idx,
        }
    }

    /// Index for a character, falling back to [`UNK_INDEX`].
    pub fn index_of(&self, c: char) -> u32 {
        self.char_to_idx.get(&c).copied().unwrap_or(UNK_INDEX)
    }

    /// Token stored at `idx`.
    pub fn token(&self, idx: u32) -> Option<&str> {
        self.tokens.get(idx as usize).map(String::as_str)
    }

    /// All tokens in index order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

/// Closed, ordered set of standardized names the classifier predicts into.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
    names: Vec<String>,
    name_to_idx: HashMap<String, usize>,
}

impl LabelSet {
    /// Build a label set from an ordered list of unique names.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(NomenclatorError::EmptyLabelSet);
        }

        let mut name_to_idx = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            if name_to_idx.insert(name.clone(), idx).is_some() {
                return Err(NomenclatorError::DuplicateLabel(name.clone()));
            }
        }

        Ok(Self { names, name_to_idx })
    }

    /// The TG-263 label set from [`STANDARD_NAMES`].
    pub fn standard() -> Self {
        let names: Vec<String> = STANDARD_NAMES.iter().map(|n| n.to_string()).collect();
        let name_to_idx = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        Self { names, name_to_idx }
    }

    /// Label index for a standardized name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_idx.get(name).copied()
    }

    /// Like [`LabelSet::index_of`], but an absent name is an error.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| NomenclatorError::UnknownLabel {
                label: name.to_string(),
            })
    }

    /// Standardized name for a label index.
    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    /// All names in label-index order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::standard()
    }
}
