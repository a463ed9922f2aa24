//! KWS CLI Binary
//! Trains and runs keyword-spotting models using Candle

use std::{fs::File, io::BufWriter, sync::Arc};

use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};

mod cli;
use cli::{Cli, Commands, InspectCommand, PredictCommand, TrainCommand};

use kws::{
    BcResNet, DataLoader, Dataset, FeatureExtractor, KwsConfig, Preprocessor,
    SpeechCommands, Trainer,
    audio::read_wav_mono,
    checkpoint::{self, ModelCard},
};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Train(cmd) => train(cmd),
        Commands::Predict(cmd) => predict(cmd),
        Commands::Inspect(cmd) => inspect(cmd),
    };
    if let Err(e) = outcome {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn device_for(gpu: Option<usize>) -> Result<Device> {
    let device = match gpu {
        Some(ordinal) => Device::cuda_if_available(ordinal)?,
        None => Device::Cpu,
    };
    info!("using device {device:?}");
    Ok(device)
}

fn train(cmd: TrainCommand) -> Result<()> {
    let cfg: KwsConfig = cmd.config.resolve().context("invalid configuration")?;

    if cmd.download || cfg.download {
        // acquisition is external: point at the archives and stop
        let (train_url, test_url) = cfg.version.archive_urls();
        println!("{train_url}");
        println!("{test_url}");
        info!(
            "extract both archives under {} and split them into {} / {}",
            cfg.data_root.display(),
            kws::constants::TRAIN_SPLIT_DIR,
            kws::constants::VALID_SPLIT_DIR
        );
        return Ok(());
    }

    let device = device_for(cfg.gpu)?;
    let sr = cfg.features.sample_rate;

    let train_set = SpeechCommands::open(cfg.train_dir(), sr)
        .with_context(|| format!("opening {}", cfg.train_dir().display()))?;
    let labels = train_set.labels().to_vec();
    let valid_set = SpeechCommands::with_labels(cfg.valid_dir(), &labels, sr)
        .with_context(|| format!("opening {}", cfg.valid_dir().display()))?;
    info!("classes: {labels:?}");

    let preprocessor = Preprocessor::from_config(&cfg, device.clone())?;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = BcResNet::new(cfg.tau, labels.len(), vb)?;

    let train_loader = DataLoader::new(Arc::new(train_set), &cfg.loader);
    let valid_loader = DataLoader::sequential(Arc::new(valid_set), cfg.loader.batch_size);
    let mut trainer = Trainer::new(
        &cfg,
        model,
        &varmap,
        preprocessor,
        train_loader,
        valid_loader,
    )?;

    let history = trainer.run()?;
    info!(
        "best valid acc {:.2}% at epoch {:?}",
        history.best_valid_acc, history.best_epoch
    );

    if !cmd.no_test {
        if cfg.test_dir().is_dir() {
            let test_set = SpeechCommands::with_labels(cfg.test_dir(), &labels, sr)?;
            let test_loader = DataLoader::sequential(Arc::new(test_set), cfg.loader.batch_size);
            let report = trainer.evaluate(&test_loader, false)?;
            info!(
                "test acc {:.2}% loss {:.4} ({} clips)",
                report.accuracy, report.loss, report.samples
            );
        } else {
            warn!("no test split at {}, skipping", cfg.test_dir().display());
        }
    }

    let card = ModelCard {
        labels,
        tau: cfg.tau,
        features: cfg.features.clone(),
        best_valid_acc: Some(history.best_valid_acc),
    };
    checkpoint::save(&cmd.output, &varmap, &card)?;
    let history_path = cmd.output.join("history.json");
    serde_json::to_writer_pretty(BufWriter::new(File::create(&history_path)?), &history)?;
    info!("history written to {}", history_path.display());
    Ok(())
}

fn predict(cmd: PredictCommand) -> Result<()> {
    let device = device_for(cmd.gpu)?;
    let (model, card, _varmap) = checkpoint::load(&cmd.checkpoint, &device)
        .with_context(|| format!("loading checkpoint {}", cmd.checkpoint.display()))?;

    let extractor = FeatureExtractor::new(&card.features)?;
    let clip = read_wav_mono(&cmd.wav, card.features.sample_rate)?;
    let ranked = checkpoint::rank_labels(&model, &card, &extractor, &clip, &device)
        .with_context(|| format!("classifying {}", cmd.wav.display()))?;
    for (label, p) in ranked.into_iter().take(cmd.top.max(1)) {
        println!("{label:<12} {p:.4}");
    }
    Ok(())
}

fn inspect(cmd: InspectCommand) -> Result<()> {
    if let Some(dir) = &cmd.checkpoint {
        let card = checkpoint::read_card(dir)?;
        println!("{}", serde_json::to_string_pretty(&card)?);
        return Ok(());
    }

    let cfg = cmd.config.resolve()?;
    println!("{}", toml::to_string_pretty(&cfg)?);

    // Dataset summary when the layout is present
    for (split, dir) in [("train", cfg.train_dir()), ("valid", cfg.valid_dir()), ("test", cfg.test_dir())] {
        if dir.is_dir() {
            let ds = SpeechCommands::open(&dir, cfg.features.sample_rate)?;
            info!("{split}: {} clips, {} classes", ds.len(), ds.labels().len());
        }
    }
    Ok(())
}
