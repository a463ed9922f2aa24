//! Command Line Interface for the KWS trainer
//!
//! Flags override the optional TOML file, which overrides the defaults.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use kws::{KwsConfig, Tau};

/// Keyword-spotting trainer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a BC-ResNet on Google Speech Commands
    Train(TrainCommand),

    /// Classify one WAV file with a trained checkpoint
    Predict(PredictCommand),

    /// Print the resolved configuration, or a checkpoint's model card
    Inspect(InspectCommand),
}

/// Options shared by every command that builds a run configuration.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Speech Commands release (1 or 2)
    #[arg(long = "ver", id = "dataset_version")]
    pub version: Option<u8>,

    /// Model capacity: 1, 1.5, 2, 3, 6 or 8
    #[arg(long)]
    pub tau: Option<Tau>,

    /// CUDA device ordinal
    #[arg(long, conflicts_with = "cpu")]
    pub gpu: Option<usize>,

    /// Force CPU even when CUDA is available
    #[arg(long)]
    pub cpu: bool,

    /// Root directory holding the extracted datasets
    #[arg(long)]
    pub data_root: Option<PathBuf>,

    /// RNG seed for shuffling and augmentation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of training epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Warmup epochs
    #[arg(long)]
    pub warmup_epochs: Option<usize>,

    /// Batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,
}

impl ConfigArgs {
    /// Defaults → TOML file → flags.
    pub fn resolve(&self) -> anyhow::Result<KwsConfig> {
        let mut cfg = match &self.config {
            Some(path) => KwsConfig::from_toml_file(path)?,
            None => KwsConfig::default(),
        };
        if let Some(v) = self.version {
            cfg.version = v.try_into()?;
        }
        if let Some(tau) = self.tau {
            cfg.tau = tau;
        }
        if let Some(gpu) = self.gpu {
            cfg.gpu = Some(gpu);
        }
        if self.cpu {
            cfg.gpu = None;
        }
        if let Some(root) = &self.data_root {
            cfg.data_root = root.clone();
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if let Some(epochs) = self.epochs {
            cfg.schedule.epochs = epochs;
        }
        if let Some(warmup) = self.warmup_epochs {
            cfg.schedule.warmup_epochs = warmup;
        }
        if let Some(bs) = self.batch_size {
            cfg.loader.batch_size = bs;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Train a new model
#[derive(Parser, Debug)]
pub struct TrainCommand {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Print the dataset archive URLs and exit
    #[arg(long)]
    pub download: bool,

    /// Directory for the checkpoint and training history
    #[arg(short, long, default_value = "runs/kws")]
    pub output: PathBuf,

    /// Skip the final pass over the official test split
    #[arg(long)]
    pub no_test: bool,
}

/// Classify a WAV file
#[derive(Parser, Debug)]
pub struct PredictCommand {
    /// Checkpoint directory written by `train`
    #[arg(short = 'm', long)]
    pub checkpoint: PathBuf,

    /// CUDA device ordinal (CPU when absent)
    #[arg(long)]
    pub gpu: Option<usize>,

    /// Number of ranked labels to print
    #[arg(short = 'k', long, default_value_t = 3)]
    pub top: usize,

    /// WAV file to classify
    pub wav: PathBuf,
}

/// Inspect configuration or a checkpoint
#[derive(Parser, Debug)]
pub struct InspectCommand {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Show this checkpoint's model card instead of the run configuration
    #[arg(short = 'm', long)]
    pub checkpoint: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "kws", "train", "--ver", "2", "--tau", "1.5", "--cpu", "--epochs", "3",
        ]);
        let Commands::Train(cmd) = cli.command else {
            panic!("expected train");
        };
        let cfg = cmd.config.resolve().unwrap();
        assert_eq!(u8::from(cfg.version), 2);
        assert_eq!(cfg.tau, Tau::X1_5);
        assert_eq!(cfg.gpu, None);
        assert_eq!(cfg.schedule.epochs, 3);
    }

    #[test]
    fn invalid_tau_is_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["kws", "train", "--tau", "4"]).is_err());
    }
}
