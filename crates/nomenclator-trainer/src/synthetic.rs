//! # Synthetic Data Generator
//!
//! Expands each standardized name into spellings seen in clinical
//! structure sets: laterality written as a suffix ("Parotid lt") or a
//! prefix ("Left Parotid"), anatomy abbreviations ("SC", "Hepatic"), and
//! surface noise (case, delimiters, stray whitespace).
//!
//! Variant policy for a name and a requested `count`:
//!
//! 1. A trailing `_L`/`_R` is split off as the laterality.
//! 2. Base forms are the remaining base plus every alias substitution of
//!    every alias key found in it. A key contained in a longer key that
//!    also matches is skipped, so `Lungs` is not rewritten through `Lung`.
//! 3. Lateral names combine each base form with every suffix and prefix
//!    spelling of their side.
//! 4. The first `count / 2` candidates after a shuffle each get one
//!    random noise transform, added as extra candidates.
//! 5. Candidates are deduplicated and shuffled, the name itself is
//!    removed, `count - 1` are kept and the unmodified name is inserted
//!    at a random position.

use std::collections::HashSet;

use nomenclator_core::{LabelSet, Result, TrainingExample};
use oorandom::Rand32;
use tracing::{debug, info};

use crate::data::shuffle;

const LEFT_SUFFIXES: &[&str] = &[
    "_L", "_l", " L", " l", " left", " Left", " lt", " LT", "-L", "-l",
];
const RIGHT_SUFFIXES: &[&str] = &[
    "_R", "_r", " R", " r", " right", " Right", " rt", " RT", "-R", "-r",
];
const LEFT_PREFIXES: &[&str] = &["Left ", "left ", "LEFT ", "Lt ", "lt ", "L "];
const RIGHT_PREFIXES: &[&str] = &["Right ", "right ", "RIGHT ", "Rt ", "rt ", "R "];

/// Canonical substrings and the spellings they are replaced with.
const ANATOMY_ALIASES: &[(&str, &[&str])] = &[
    ("Parotid", &["parotid", "PAROTID", "Parot", "Par"]),
    ("Submand", &["submand", "SUBMAND", "Submandibular", "submandibular"]),
    ("SpinalCord", &["Spinal Cord", "spinal cord", "SC", "Cord", "cord"]),
    ("Brainstem", &["Brain Stem", "brain stem", "BS", "brainstem"]),
    ("Bladder", &["bladder", "BLADDER", "UB", "Urinary Bladder"]),
    ("Rectum", &["rectum", "RECTUM", "Rectal"]),
    ("Esophagus", &["esophagus", "ESOPHAGUS", "Eso", "Oesophagus"]),
    ("FemoralHead", &["Femoral Head", "femoral head", "Femur Head", "FemHead"]),
    ("OpticNrv", &["Optic Nerve", "optic nerve", "ON", "OptNerve"]),
    ("Cochlea", &["cochlea", "COCHLEA", "Inner Ear"]),
    ("Lens", &["lens", "LENS"]),
    ("Heart", &["heart", "HEART", "Cardiac"]),
    ("Lung", &["lung", "LUNG"]),
    ("Lungs", &["lungs", "LUNGS", "Both Lungs", "Bilateral Lungs"]),
    ("Liver", &["liver", "LIVER", "Hepatic"]),
    ("Kidney", &["kidney", "KIDNEY"]),
    ("Kidneys", &["kidneys", "KIDNEYS", "Both Kidneys"]),
    ("Prostate", &["prostate", "PROSTATE", "Prostate Gland"]),
    ("GTV", &["gtv", "Gtv", "GTV Primary", "Primary GTV"]),
    ("CTV", &["ctv", "Ctv", "CTV Primary", "Primary CTV"]),
    ("PTV", &["ptv", "Ptv", "PTV Primary", "Primary PTV"]),
    ("ITV", &["itv", "Itv", "Internal Target"]),
    ("Body", &["body", "BODY", "External", "Skin", "Patient"]),
    ("BoneMarrow", &["Bone Marrow", "bone marrow", "Marrow"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn suffixes(self) -> &'static [&'static str] {
        match self {
            Side::Left => LEFT_SUFFIXES,
            Side::Right => RIGHT_SUFFIXES,
        }
    }

    fn prefixes(self) -> &'static [&'static str] {
        match self {
            Side::Left => LEFT_PREFIXES,
            Side::Right => RIGHT_PREFIXES,
        }
    }
}

/// Split a trailing `_L`/`_R` off `name`.
fn split_laterality(name: &str) -> (&str, Option<Side>) {
    if let Some(base) = name.strip_suffix("_L") {
        (base, Some(Side::Left))
    } else if let Some(base) = name.strip_suffix("_R") {
        (base, Some(Side::Right))
    } else {
        (name, None)
    }
}

/// `base` and every alias rewrite of it, without duplicates.
fn base_forms(base: &str) -> Vec<String> {
    let matching: Vec<&(&str, &[&str])> = ANATOMY_ALIASES
        .iter()
        .filter(|(key, _)| base.contains(key))
        .collect();

    let mut forms = vec![base.to_string()];
    for (key, aliases) in &matching {
        let shadowed = matching
            .iter()
            .any(|(other, _)| other.len() > key.len() && other.contains(key));
        if shadowed {
            continue;
        }
        for alias in aliases.iter() {
            let form = base.replace(key, alias);
            if !forms.contains(&form) {
                forms.push(form);
            }
        }
    }
    forms
}

/// Surface-level corruption applied to some candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Noise {
    Upper,
    Lower,
    Title,
    LeadingSpace,
    TrailingSpace,
    UnderscoreToSpace,
    UnderscoreToHyphen,
    SpaceToUnderscore,
}

impl Noise {
    pub const ALL: [Noise; 8] = [
        Noise::Upper,
        Noise::Lower,
        Noise::Title,
        Noise::LeadingSpace,
        Noise::TrailingSpace,
        Noise::UnderscoreToSpace,
        Noise::UnderscoreToHyphen,
        Noise::SpaceToUnderscore,
    ];

    pub fn apply(self, s: &str) -> String {
        match self {
            Noise::Upper => s.to_uppercase(),
            Noise::Lower => s.to_lowercase(),
            Noise::Title => title_case(s),
            Noise::LeadingSpace => format!(" {s}"),
            Noise::TrailingSpace => format!("{s} "),
            Noise::UnderscoreToSpace => s.replace('_', " "),
            Noise::UnderscoreToHyphen => s.replace('_', "-"),
            Noise::SpaceToUnderscore => s.replace(' ', "_"),
        }
    }
}

/// Upper-case the first letter of every alphabetic run, lower-case the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Seeded generator of (variant, standard name) training pairs.
pub struct SyntheticDataGenerator {
    names: Vec<String>,
    rng: Rand32,
}

impl SyntheticDataGenerator {
    pub fn new<I, S>(names: I, seed: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            rng: Rand32::new(seed),
        }
    }

    /// Generator over every name in `labels`.
    pub fn for_labels(labels: &LabelSet, seed: u64) -> Self {
        Self::new(labels.names().iter().cloned(), seed)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Up to `count` spellings of `name`, always including `name` itself.
    pub fn generate_variations(&mut self, name: &str, count: usize) -> Vec<String> {
        let count = count.max(1);
        let (base, side) = split_laterality(name);
        let bases = base_forms(base);

        let mut candidates: Vec<String> = match side {
            Some(side) => bases
                .iter()
                .flat_map(|form| {
                    let suffixed = side.suffixes().iter().map(move |s| format!("{form}{s}"));
                    let prefixed = side.prefixes().iter().map(move |p| format!("{p}{form}"));
                    suffixed.chain(prefixed)
                })
                .collect(),
            None => bases,
        };

        shuffle(&mut candidates, &mut self.rng);
        let noisy: Vec<String> = candidates
            .iter()
            .take(count / 2)
            .map(|candidate| {
                let pick = self.rng.rand_range(0..Noise::ALL.len() as u32) as usize;
                Noise::ALL[pick].apply(candidate)
            })
            .collect();
        candidates.extend(noisy);

        let mut seen = HashSet::new();
        candidates.retain(|c| c != name && seen.insert(c.clone()));
        shuffle(&mut candidates, &mut self.rng);
        candidates.truncate(count - 1);

        let position = self.rng.rand_range(0..candidates.len() as u32 + 1) as usize;
        candidates.insert(position, name.to_string());
        candidates
    }

    /// Variations of every generator name, labelled and shuffled.
    ///
    /// Fails with `UnknownLabel` before generating anything if a generator
    /// name is missing from `labels`.
    pub fn generate_dataset(
        &mut self,
        labels: &LabelSet,
        variations_per_name: usize,
    ) -> Result<Vec<TrainingExample>> {
        for name in &self.names {
            labels.require(name)?;
        }

        let names = self.names.clone();
        let mut dataset = Vec::with_capacity(names.len() * variations_per_name);
        for name in &names {
            let variations = self.generate_variations(name, variations_per_name);
            debug!("{} -> {} variations", name, variations.len());
            dataset.extend(
                variations
                    .into_iter()
                    .map(|text| TrainingExample::new(text, name.as_str())),
            );
        }

        shuffle(&mut dataset, &mut self.rng);
        info!(
            "Generated {} synthetic examples for {} labels",
            dataset.len(),
            names.len()
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use nomenclator_core::NomenclatorError;

    use super::*;

    #[test]
    fn test_split_laterality() {
        assert_eq!(split_laterality("Parotid_L"), ("Parotid", Some(Side::Left)));
        assert_eq!(split_laterality("Kidney_R"), ("Kidney", Some(Side::Right)));
        assert_eq!(split_laterality("Bowel_Large"), ("Bowel_Large", None));
        assert_eq!(split_laterality("GTV"), ("GTV", None));
    }

    #[test]
    fn test_base_forms_skip_shadowed_keys() {
        let forms = base_forms("Lungs");
        assert_eq!(
            forms,
            vec!["Lungs", "lungs", "LUNGS", "Both Lungs", "Bilateral Lungs"]
        );
        assert!(!forms.contains(&"LUNGs".to_string()));

        let forms = base_forms("Lung");
        assert_eq!(forms, vec!["Lung", "lung", "LUNG"]);
    }

    #[test]
    fn test_base_forms_without_alias() {
        assert_eq!(base_forms("Trachea"), vec!["Trachea"]);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("left PAROTID_l"), "Left Parotid_L");
        assert_eq!(Noise::Title.apply("gtv primary"), "Gtv Primary");
    }

    #[test]
    fn test_noise_transforms() {
        assert_eq!(Noise::Upper.apply("Lens_L"), "LENS_L");
        assert_eq!(Noise::UnderscoreToSpace.apply("Lens_L"), "Lens L");
        assert_eq!(Noise::UnderscoreToHyphen.apply("Lens_L"), "Lens-L");
        assert_eq!(Noise::SpaceToUnderscore.apply("Lt Lens"), "Lt_Lens");
        assert_eq!(Noise::LeadingSpace.apply("Lens"), " Lens");
        assert_eq!(Noise::TrailingSpace.apply("Lens"), "Lens ");
    }

    #[test]
    fn test_variations_contain_name_and_respect_count() {
        let mut generator = SyntheticDataGenerator::new(Vec::<String>::new(), 3);
        for name in ["Parotid_L", "Heart", "Trachea", "SpinalCord", "FemoralHead_R"] {
            for count in [0, 1, 2, 5, 20, 200] {
                let variations = generator.generate_variations(name, count);
                assert!(variations.iter().any(|v| v == name), "{name} missing");
                assert!(variations.len() <= count.max(1));
                let unique: HashSet<_> = variations.iter().collect();
                assert_eq!(unique.len(), variations.len());
            }
        }
    }

    #[test]
    fn test_variations_fill_requested_count() {
        let mut generator = SyntheticDataGenerator::new(Vec::<String>::new(), 5);
        assert_eq!(generator.generate_variations("Parotid_L", 20).len(), 20);
        // Nothing to rewrite: only the name and its noisy copies remain.
        assert!(generator.generate_variations("Trachea", 20).len() < 20);
    }

    #[test]
    fn test_lateral_variations_include_prefix_and_suffix_forms() {
        let mut generator = SyntheticDataGenerator::new(Vec::<String>::new(), 11);
        let variations = generator.generate_variations("Parotid_L", 500);
        assert!(variations.contains(&"Left parotid".to_string()));
        assert!(variations.contains(&"Parotid lt".to_string()));
        assert!(variations.contains(&"Lt Parot".to_string()));
        assert!(!variations.iter().any(|v| v.contains("right") || v.contains("Rt ")));
    }

    #[test]
    fn test_dataset_is_reproducible() {
        let labels = LabelSet::standard();
        let a = SyntheticDataGenerator::for_labels(&labels, 42)
            .generate_dataset(&labels, 10)
            .unwrap();
        let b = SyntheticDataGenerator::for_labels(&labels, 42)
            .generate_dataset(&labels, 10)
            .unwrap();
        assert_eq!(a, b);

        let c = SyntheticDataGenerator::for_labels(&labels, 43)
            .generate_dataset(&labels, 10)
            .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_dataset_covers_every_label() {
        let labels = LabelSet::standard();
        let dataset = SyntheticDataGenerator::for_labels(&labels, 1)
            .generate_dataset(&labels, 5)
            .unwrap();
        for name in labels.names() {
            assert!(dataset.iter().any(|e| &e.label == name && &e.text == name));
        }
        assert!(dataset.iter().all(|e| labels.index_of(&e.label).is_some()));
    }

    #[test]
    fn test_dataset_rejects_unknown_label() {
        let labels = LabelSet::standard();
        let mut generator = SyntheticDataGenerator::new(["Heart", "Pancreas"], 1);
        let err = generator.generate_dataset(&labels, 5).unwrap_err();
        assert!(matches!(err, NomenclatorError::UnknownLabel { label } if label == "Pancreas"));
    }
}
