//! Batch → model input.
//!
//! waveform augmentation (optional) → log-mel → SpecAugment (optional) →
//! `[B, 1, mel_bins, frames]` tensor on the device chosen at construction.

use candle_core::{Device, Tensor};
use rand::Rng;

use crate::{
    augment::{SpectralAugmenter, WaveformAugmenter},
    config::KwsConfig,
    dataset::Batch,
    error::Result,
    features::{FeatureExtractor, Spectrogram},
};

pub struct Preprocessor {
    extractor: FeatureExtractor,
    waveform: WaveformAugmenter,
    spectral: SpectralAugmenter,
    device: Device,
}

impl Preprocessor {
    pub fn new(
        extractor: FeatureExtractor,
        waveform: WaveformAugmenter,
        spectral: SpectralAugmenter,
        device: Device,
    ) -> Self {
        Self {
            extractor,
            waveform,
            spectral,
            device,
        }
    }

    /// Build every stage from the run config, loading the noise pool if needed.
    pub fn from_config(cfg: &KwsConfig, device: Device) -> Result<Self> {
        Ok(Self::new(
            FeatureExtractor::new(&cfg.features)?,
            WaveformAugmenter::from_config(cfg)?,
            SpectralAugmenter::new(cfg.tau, &cfg.spec_augment),
            device,
        ))
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// One clip through the pipeline.
    pub fn spectrogram<R: Rng + ?Sized>(
        &self,
        waveform: &[f32],
        label: u32,
        augment: bool,
        spec_augment: bool,
        rng: &mut R,
    ) -> Result<Spectrogram> {
        let spec = if augment {
            let augmented = self.waveform.apply(waveform, label, rng)?;
            self.extractor.extract(&augmented)?
        } else {
            self.extractor.extract(waveform)?
        };
        Ok(if spec_augment {
            self.spectral.apply(&spec, rng)
        } else {
            spec
        })
    }

    /// Feature tensor `[B, 1, mel_bins, frames]` for a whole batch.
    pub fn features<R: Rng + ?Sized>(
        &self,
        batch: &Batch,
        augment: bool,
        spec_augment: bool,
        rng: &mut R,
    ) -> Result<Tensor> {
        let (n_mels, frames) = (self.extractor.n_mels(), self.extractor.frames());
        let mut data = Vec::with_capacity(batch.len() * n_mels * frames);
        for (waveform, label) in batch.iter() {
            let spec = self.spectrogram(waveform, label, augment, spec_augment, rng)?;
            data.extend(spec.into_vec());
        }
        Ok(Tensor::from_vec(
            data,
            (batch.len(), 1, n_mels, frames),
            &self.device,
        )?)
    }

    /// Label vector `[B]` (u32) on the same device.
    pub fn labels(&self, batch: &Batch) -> Result<Tensor> {
        Ok(Tensor::new(batch.labels.as_slice(), &self.device)?)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        config::{FeatureConfig, SpecAugmentConfig, Tau},
        dataset::Sample,
    };

    fn preprocessor(tau: Tau) -> Preprocessor {
        Preprocessor::new(
            FeatureExtractor::new(&FeatureConfig::default()).unwrap(),
            WaveformAugmenter::identity(),
            SpectralAugmenter::new(tau, &SpecAugmentConfig::default()),
            Device::Cpu,
        )
    }

    #[test]
    fn batch_tensor_has_channel_axis() {
        let pre = preprocessor(Tau::X1);
        let batch: Batch = [
            Sample::new(vec![0.1; 8_000], 0),
            Sample::new(vec![0.2; 32_000], 1),
        ]
        .into_iter()
        .collect();
        let mut rng = StdRng::seed_from_u64(0);
        let x = pre.features(&batch, true, true, &mut rng).unwrap();
        assert_eq!(x.dims(), &[2, 1, 40, 201]);
        let y = pre.labels(&batch).unwrap();
        assert_eq!(y.to_vec1::<u32>().unwrap(), vec![0, 1]);
    }

    #[test]
    fn spec_augment_is_skipped_when_not_requested() {
        let pre = preprocessor(Tau::X8);
        let clip: Vec<f32> = (0..16_000).map(|i| (i as f32 * 0.03).sin()).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let plain = pre.spectrogram(&clip, 2, false, false, &mut rng).unwrap();
        assert_eq!(plain, pre.extractor().extract(&clip).unwrap());
    }

    #[test]
    fn overlong_clip_propagates_length_exceeded() {
        let pre = preprocessor(Tau::X1);
        let batch: Batch = [Sample::new(vec![0.0; 32_001], 0)].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(0);
        let err = pre.features(&batch, false, false, &mut rng).unwrap_err();
        assert!(matches!(err, crate::KwsError::LengthExceeded { .. }));
    }
}
