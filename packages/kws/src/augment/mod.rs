//! Two-stage data augmentation.
//!
//! * [`WaveformAugmenter`] – randomized time-domain chain, applied before
//!   feature extraction.
//! * [`SpectralAugmenter`] – SpecAugment masking, applied after it.
//!
//! Every random draw comes from the caller's RNG; a seeded `StdRng`
//! replays a run exactly.

mod noise;
mod spec;
mod stretch;

pub use noise::NoisePool;
pub use spec::SpectralAugmenter;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::{
    config::{AugmentConfig, KwsConfig, Span, StageConfig},
    error::{KwsError, Result},
};
use stretch::{PhaseVocoder, fix_length, pitch_shift};

/* ───────────────────────── waveform chain ───────────────────────── */

/// Gaussian noise → time-stretch → pitch shift → gain → shift → background noise.
///
/// Each stage draws its own trigger probability from its configured range
/// on every call, then fires with that probability.
pub struct WaveformAugmenter {
    cfg: AugmentConfig,
    noise: Option<NoisePool>,
    vocoder: PhaseVocoder,
}

impl WaveformAugmenter {
    /// Build from an explicit config and (optional) pre-loaded noise pool.
    ///
    /// Fails with a configuration error when a stage needs the pool and none
    /// is given.
    pub fn new(cfg: &AugmentConfig, noise: Option<NoisePool>) -> Result<Self> {
        if cfg.needs_noise_pool() && noise.is_none() {
            return Err(KwsError::config(
                "background noise is enabled but no noise pool was provided",
            ));
        }
        Ok(Self {
            cfg: cfg.clone(),
            noise,
            vocoder: PhaseVocoder::default(),
        })
    }

    /// Build from the run config, loading the noise pool from the dataset
    /// layout when any stage needs it.
    pub fn from_config(cfg: &KwsConfig) -> Result<Self> {
        let noise = if cfg.augment.needs_noise_pool() {
            Some(NoisePool::load_dir(
                cfg.noise_dir(),
                cfg.features.sample_rate,
            )?)
        } else {
            None
        };
        Self::new(&cfg.augment, noise)
    }

    /// Chain with every stage disabled; returns its input unchanged.
    pub fn identity() -> Self {
        Self {
            cfg: AugmentConfig::identity(),
            noise: None,
            vocoder: PhaseVocoder::default(),
        }
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.cfg
    }

    /// Run the chain over one clip. `label` only matters for the forced
    /// background noise of the silence class.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        waveform: &[f32],
        label: u32,
        rng: &mut R,
    ) -> Result<Vec<f32>> {
        let c = &self.cfg;
        let mut x = waveform.to_vec();

        if fires(rng, &c.gaussian_noise) {
            let amp = draw(rng, c.gaussian_noise.magnitude);
            for s in x.iter_mut() {
                let n: f32 = StandardNormal.sample(rng);
                *s += amp * n;
            }
        }

        if fires(rng, &c.time_stretch) {
            let rate = draw(rng, c.time_stretch.magnitude);
            let len = x.len();
            x = self.vocoder.stretch(&x, rate);
            if c.leave_length_unchanged {
                x = fix_length(x, len);
            }
        }

        if fires(rng, &c.pitch_shift) {
            let semitones = draw(rng, c.pitch_shift.magnitude);
            x = pitch_shift(&self.vocoder, &x, semitones)?;
        }

        if fires(rng, &c.gain) {
            let db = draw(rng, c.gain.magnitude);
            let g = 10f32.powf(db / 20.0);
            x.iter_mut().for_each(|s| *s *= g);
        }

        if fires(rng, &c.shift) {
            let frac = draw(rng, c.shift.magnitude);
            x = shift(&x, frac, c.shift_rollover);
        }

        let forced = c.silence_label == Some(label);
        if forced || fires(rng, &c.background_noise) {
            let snr = draw(rng, c.background_noise.magnitude);
            if let Some(pool) = &self.noise {
                x = pool.mix(&x, snr, rng);
            }
        }

        Ok(x)
    }
}

/* ───────────────────────── helpers ───────────────────────── */

/// Uniform draw from a closed span; degenerate spans return `min`.
fn draw<R: Rng + ?Sized>(rng: &mut R, span: Span) -> f32 {
    if span.min >= span.max {
        span.min
    } else {
        rng.random_range(span.min..=span.max)
    }
}

/// Draw this call's trigger probability, then flip the coin.
fn fires<R: Rng + ?Sized>(rng: &mut R, stage: &StageConfig) -> bool {
    if stage.is_disabled() {
        return false;
    }
    let p = draw(rng, stage.probability);
    rng.random::<f32>() < p
}

/// Move samples right by `frac × len` (left when negative).
fn shift(x: &[f32], frac: f32, rollover: bool) -> Vec<f32> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let places = (frac * n as f32) as isize;
    let k = places.rem_euclid(n as isize) as usize;
    let mut out = x.to_vec();
    out.rotate_right(k);
    if !rollover {
        if places > 0 {
            out[..places as usize].fill(0.0);
        } else if places < 0 {
            out[n - places.unsigned_abs()..].fill(0.0);
        }
    }
    out
}
