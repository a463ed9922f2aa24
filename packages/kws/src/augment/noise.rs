//! Background-noise pool and SNR-controlled mixing.

use std::path::Path;

use rand::{Rng, seq::IndexedRandom};

use crate::{
    audio::{read_wav_mono, rms},
    constants::BACKGROUND_MIN_RMS,
    error::{KwsError, Result},
};

/// Fixed set of mono noise clips, decoded once at startup.
#[derive(Clone, Debug)]
pub struct NoisePool {
    clips: Vec<Vec<f32>>,
}

impl NoisePool {
    /// Wrap pre-decoded clips. Empty clips are dropped; an empty pool is an error.
    pub fn new(clips: Vec<Vec<f32>>) -> Result<Self> {
        let clips: Vec<_> = clips.into_iter().filter(|c| !c.is_empty()).collect();
        if clips.is_empty() {
            return Err(KwsError::config("background noise pool is empty"));
        }
        Ok(Self { clips })
    }

    /// Decode every `*.wav` under `dir` (sorted by name) at `sample_rate`.
    pub fn load_dir<P: AsRef<Path>>(dir: P, sample_rate: usize) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(KwsError::config(format!(
                "background noise directory {} does not exist",
                dir.display()
            )));
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("wav")))
            .collect();
        paths.sort();

        let clips = paths
            .iter()
            .map(|p| read_wav_mono(p, sample_rate))
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "loaded {} background noise clips from {}",
            clips.len(),
            dir.display()
        );
        Self::new(clips).map_err(|_| {
            KwsError::config(format!("no usable noise clips in {}", dir.display()))
        })
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn clips(&self) -> &[Vec<f32>] {
        &self.clips
    }

    /// Add a random pool clip to `signal` at `snr_db`.
    ///
    /// The clip is tiled when shorter than the signal and cropped at a random
    /// offset otherwise. A silent signal has no SNR reference, so it receives
    /// the clip at its native level. Near-silent clips are skipped.
    pub(crate) fn mix<R: Rng + ?Sized>(&self, signal: &[f32], snr_db: f32, rng: &mut R) -> Vec<f32> {
        let n = signal.len();
        let Some(clip) = self.clips.choose(rng) else {
            return signal.to_vec();
        };
        if n == 0 {
            return Vec::new();
        }

        let noise: Vec<f32> = if clip.len() >= n {
            let offset = rng.random_range(0..=clip.len() - n);
            clip[offset..offset + n].to_vec()
        } else {
            clip.iter().copied().cycle().take(n).collect()
        };

        let noise_rms = rms(&noise);
        if noise_rms < BACKGROUND_MIN_RMS {
            log::debug!("skipping near-silent background clip (rms={noise_rms:e})");
            return signal.to_vec();
        }

        let signal_rms = rms(signal);
        let gain = if signal_rms < BACKGROUND_MIN_RMS {
            1.0
        } else {
            signal_rms / 10f32.powf(snr_db / 20.0) / noise_rms
        };
        signal
            .iter()
            .zip(&noise)
            .map(|(s, v)| s + gain * v)
            .collect()
    }
}
