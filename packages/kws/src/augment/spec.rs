//! SpecAugment-style masking over a log-mel spectrogram.

use std::ops::Range;

use rand::Rng;

use crate::{
    config::{MaskValue, SpecAugmentConfig, Tau},
    features::Spectrogram,
};

/// Frequency (and optional time) masking whose band width follows `tau`.
///
/// Disabled entirely for `tau < 1.5`: [`apply`](Self::apply) then returns an
/// unchanged copy and draws nothing from the RNG.
#[derive(Clone, Debug)]
pub struct SpectralAugmenter {
    enabled: bool,
    freq_masking_para: usize,
    freq_mask_num: usize,
    time_masking_para: usize,
    time_mask_num: usize,
    mask_value: MaskValue,
}

impl SpectralAugmenter {
    pub fn new(tau: Tau, cfg: &SpecAugmentConfig) -> Self {
        Self {
            enabled: tau.spec_augment_enabled(),
            freq_masking_para: tau.frequency_masking_para(),
            freq_mask_num: cfg.freq_mask_num,
            time_masking_para: cfg.time_masking_para,
            time_mask_num: cfg.time_mask_num,
            mask_value: cfg.mask_value,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Largest frequency band that may be masked.
    pub fn freq_masking_para(&self) -> usize {
        self.freq_masking_para
    }

    /// Return a masked copy of `spec`; the input is left untouched.
    pub fn apply<R: Rng + ?Sized>(&self, spec: &Spectrogram, rng: &mut R) -> Spectrogram {
        if !self.enabled {
            return spec.clone();
        }
        let fill = match self.mask_value {
            MaskValue::Zero => 0.0,
            MaskValue::Mean => spec.mean(),
        };

        let mut out = spec.clone();
        for _ in 0..self.freq_mask_num {
            let band = draw_band(rng, self.freq_masking_para, spec.n_mels());
            out = out.with_bands_filled(band, fill);
        }
        for _ in 0..self.time_mask_num {
            let span = draw_band(rng, self.time_masking_para, spec.frames());
            out = out.with_frames_filled(span, fill);
        }
        out
    }
}

/// `width ~ U[0, para]`, `start ~ U[0, extent - width]`.
fn draw_band<R: Rng + ?Sized>(rng: &mut R, para: usize, extent: usize) -> Range<usize> {
    let width = rng.random_range(0..=para.min(extent));
    let start = rng.random_range(0..=extent - width);
    start..start + width
}
