//! Trained-model persistence: safetensors weights + a JSON model card.
//!
//! ```text
//! <dir>/model.safetensors   VarMap::save
//! <dir>/model.json          ModelCard (labels, tau, front-end)
//! ```

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

use crate::{
    config::{FeatureConfig, Tau},
    error::{KwsError, Result},
    features::FeatureExtractor,
    model::{BcResNet, Classifier},
};

pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const CARD_FILE: &str = "model.json";

/// Everything needed to rebuild the classifier and its input pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelCard {
    pub labels: Vec<String>,
    pub tau: Tau,
    pub features: FeatureConfig,
    pub best_valid_acc: Option<f64>,
}

impl ModelCard {
    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }
}

/// Write weights and card into `dir` (created if missing).
pub fn save<P: AsRef<Path>>(dir: P, varmap: &VarMap, card: &ModelCard) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    varmap.save(dir.join(WEIGHTS_FILE))?;
    serde_json::to_writer_pretty(BufWriter::new(File::create(dir.join(CARD_FILE))?), card)?;
    log::info!("checkpoint written to {}", dir.display());
    Ok(())
}

/// Read only the model card of the checkpoint in `dir`.
pub fn read_card<P: AsRef<Path>>(dir: P) -> Result<ModelCard> {
    let path = dir.as_ref().join(CARD_FILE);
    Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
}

/// Rebuild a [`BcResNet`] from `dir` on `device`.
pub fn load<P: AsRef<Path>>(dir: P, device: &Device) -> Result<(BcResNet, ModelCard, VarMap)> {
    let dir = dir.as_ref();
    let card = read_card(dir)?;
    if card.labels.is_empty() {
        return Err(KwsError::config(format!(
            "model card in {} lists no labels",
            dir.display()
        )));
    }

    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = BcResNet::new(card.tau, card.num_classes(), vb)?;
    varmap.load(dir.join(WEIGHTS_FILE))?;
    Ok((model, card, varmap))
}

/// Classify one clip in eval mode: `(label, probability)` pairs sorted by
/// decreasing probability, one per class.
pub fn rank_labels<C: Classifier + ?Sized>(
    model: &C,
    card: &ModelCard,
    extractor: &FeatureExtractor,
    clip: &[f32],
    device: &Device,
) -> Result<Vec<(String, f32)>> {
    let spec = extractor.extract(clip)?;
    let (n_mels, frames) = spec.shape();
    let xs = Tensor::from_vec(spec.into_vec(), (1, 1, n_mels, frames), device)?;
    let logits = model.forward_t(&xs, false)?;
    crate::evaluate::check_logits(&logits, 1, card.num_classes())?;

    let probs: Vec<f32> = candle_nn::ops::softmax_last_dim(&logits)?
        .squeeze(0)?
        .to_vec1()?;
    let mut ranked: Vec<(String, f32)> = card.labels.iter().cloned().zip(probs).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(ranked)
}
