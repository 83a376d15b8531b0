//! Train a structure name translator on synthetic data and save the bundle.

use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::Device;
use clap::Parser;
use nomenclator_trainer::{TrainingConfig, run_training};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Names printed after training as a quick sanity check.
const PROBES: &[&str] = &[
    "left parotid",
    "Parotid_L",
    "RIGHT LUNG",
    "Spinal Cord",
    "gtv primary",
    "Bladder",
    "Lt Lens",
];

#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train a TG-263 structure name translator")]
#[command(version)]
struct Cli {
    /// JSON training config; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the model bundle
    #[arg(short, long, default_value = "models/nomenclator.safetensors")]
    output: PathBuf,

    /// Write the per-epoch history as JSON
    #[arg(long)]
    history: Option<PathBuf>,

    /// Write a checkpoint bundle whenever validation loss improves
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    patience: Option<usize>,

    /// Synthetic variations generated per standard name
    #[arg(long)]
    variations: Option<usize>,

    #[arg(long)]
    hidden_dim: Option<usize>,

    #[arg(long)]
    embedding_dim: Option<usize>,

    #[arg(long)]
    num_layers: Option<usize>,

    #[arg(long)]
    dropout: Option<f32>,

    /// Pool the final recurrent state instead of using attention
    #[arg(long)]
    no_attention: bool,

    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    fn training_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_json_file(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?,
            None => TrainingConfig::default(),
        };

        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(lr) = self.learning_rate {
            config.learning_rate = lr;
        }
        if let Some(patience) = self.patience {
            config.patience = patience;
        }
        if let Some(variations) = self.variations {
            config.variations_per_name = variations;
        }
        if let Some(dim) = self.hidden_dim {
            config.hidden_dim = dim;
        }
        if let Some(dim) = self.embedding_dim {
            config.embedding_dim = dim;
        }
        if let Some(layers) = self.num_layers {
            config.num_layers = layers;
        }
        if let Some(dropout) = self.dropout {
            config.dropout = dropout;
        }
        if self.no_attention {
            config.use_attention = false;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.checkpoint.is_some() {
            config.checkpoint_path = self.checkpoint.clone();
        }

        config.validate().context("Invalid training config")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.training_config()?;
    info!("Starting training: {:?}", config);

    let outcome = run_training(&config, &Device::Cpu).context("Training failed")?;

    outcome
        .translator
        .save(&cli.output)
        .with_context(|| format!("Failed to save model to {}", cli.output.display()))?;
    info!("Model saved to {:?}", cli.output);

    if let Some(path) = &cli.history {
        let json = serde_json::to_string_pretty(&outcome.history)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write history to {}", path.display()))?;
        info!("History saved to {:?}", path);
    }

    println!("\nSample predictions:");
    for probe in PROBES {
        let predictions = outcome.translator.predict(probe, 3)?;
        let ranked: Vec<String> = predictions.iter().map(ToString::to_string).collect();
        println!("  {:<16} -> {}", probe, ranked.join(", "));
    }

    Ok(())
}
