//! Translate structure names with a trained model bundle.

use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nomenclator_core::{Prediction, Translator};
use tracing_subscriber::EnvFilter;

/// Confidence at or above which a match counts as medium rather than low.
const MEDIUM_CONFIDENCE: f32 = 0.5;

#[derive(Parser)]
#[command(name = "translate")]
#[command(about = "Translate clinical structure names to TG-263 names")]
#[command(version)]
struct Cli {
    /// Model bundle written by `train`
    #[arg(short, long, default_value = "models/nomenclator.safetensors")]
    model: PathBuf,

    /// Candidates shown per name
    #[arg(short = 'k', long, default_value_t = 3)]
    top_k: usize,

    /// Matches below this confidence are flagged for review
    #[arg(short, long, default_value_t = 0.7)]
    threshold: f32,

    /// Names to translate; read from stdin, one per line, when empty
    names: Vec<String>,
}

fn tier(best: &Prediction, threshold: f32) -> &'static str {
    if !best.needs_review(threshold) {
        "HIGH"
    } else if best.confidence >= MEDIUM_CONFIDENCE {
        "MEDIUM"
    } else {
        "LOW"
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let translator = Translator::load(&cli.model)
        .with_context(|| format!("Failed to load model {}", cli.model.display()))?;

    let names = if cli.names.is_empty() {
        io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<Vec<_>>>()?
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .collect()
    } else {
        cli.names.clone()
    };

    let results = translator.predict_batch(&names, cli.top_k)?;
    for (name, predictions) in names.iter().zip(&results) {
        let Some(best) = predictions.first() else {
            continue;
        };
        println!("{:?} [{}]", name, tier(best, cli.threshold));
        for prediction in predictions {
            println!("    {prediction}");
        }
    }

    Ok(())
}
