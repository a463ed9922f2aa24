#![allow(clippy::many_single_char_names)]

use std::{f32::consts::PI, sync::Arc};

use rustfft::{Fft, FftPlanner, num_complex::Complex32};

use super::{Spectrogram, pad_to_length};
use crate::{
    config::FeatureConfig,
    constants::LOGMEL_EPSILON,
    error::{KwsError, Result},
};

/// Fixed-shape **log-mel spectrogram** extractor.
///
/// Pipeline per clip: [`pad_to_length`] → reflect-pad `n_fft/2` both sides →
/// periodic-Hann STFT → power spectrum → HTK mel bank → `ln(x + 1e-6)`.
///
/// No internal randomness: the same clip and configuration always produce a
/// bit-identical spectrogram. All DSP tables are built once in [`new`](Self::new).
///
/// ```no_run
/// # use kws::{config::FeatureConfig, features::FeatureExtractor};
/// let fx = FeatureExtractor::new(&FeatureConfig::default())?;
/// let spec = fx.extract(&vec![0.0; 16_000])?; // 1 s clip, padded to 2 s
/// assert_eq!(spec.shape(), (40, 201));
/// # Ok::<(), kws::KwsError>(())
/// ```
pub struct FeatureExtractor {
    // configuration
    clip_samples: usize,
    n_fft: usize,
    hop: usize,
    n_mels: usize,
    frames: usize,

    // cached DSP bits
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,           // n_fft long, window centred inside
    filter_bank: Vec<Vec<f32>>, // [mel_bin][freq_bin]
}

impl FeatureExtractor {
    pub fn new(cfg: &FeatureConfig) -> Result<Self> {
        if cfg.win_length == 0 || cfg.win_length > cfg.n_fft || cfg.hop_length == 0 {
            return Err(KwsError::config(format!(
                "invalid STFT geometry: n_fft={} win_length={} hop={}",
                cfg.n_fft, cfg.win_length, cfg.hop_length
            )));
        }
        let clip_samples = cfg.clip_samples();
        if clip_samples <= cfg.n_fft / 2 {
            return Err(KwsError::config(format!(
                "clip of {clip_samples} samples is shorter than the reflect padding"
            )));
        }

        // --- pre-compute ---
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(cfg.n_fft);

        let mut window = vec![0f32; cfg.n_fft];
        let offset = (cfg.n_fft - cfg.win_length) / 2;
        for (n, w) in periodic_hann(cfg.win_length).into_iter().enumerate() {
            window[offset + n] = w;
        }

        let n_freqs = cfg.n_fft / 2 + 1;
        let filter_bank = htk_mel_filter_bank(cfg.sample_rate, n_freqs, cfg.n_mels);

        Ok(Self {
            clip_samples,
            n_fft: cfg.n_fft,
            hop: cfg.hop_length,
            n_mels: cfg.n_mels,
            frames: cfg.frames(),
            fft,
            window,
            filter_bank,
        })
    }

    /// Fixed waveform length `T`.
    #[inline]
    pub fn clip_samples(&self) -> usize {
        self.clip_samples
    }

    /// Frames of every produced spectrogram.
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    /// Enforce the clip length, then compute the log-mel spectrogram.
    pub fn extract(&self, waveform: &[f32]) -> Result<Spectrogram> {
        let exact = pad_to_length(waveform, self.clip_samples)?;
        Ok(self.log_mel(&exact))
    }

    /// Log-mel of a clip that already has exactly `T` samples.
    fn log_mel(&self, clip: &[f32]) -> Spectrogram {
        debug_assert_eq!(clip.len(), self.clip_samples);
        let padded = reflect_pad(clip, self.n_fft / 2);
        let n_freqs = self.n_fft / 2 + 1;

        let mut out = vec![0f32; self.n_mels * self.frames];
        let mut buf = vec![Complex32::new(0.0, 0.0); self.n_fft];
        let mut power = vec![0f32; n_freqs];

        for t in 0..self.frames {
            // 1) Window + FFT
            let start = t * self.hop;
            for (dst, (&x, &w)) in buf
                .iter_mut()
                .zip(padded[start..start + self.n_fft].iter().zip(&self.window))
            {
                dst.re = x * w;
                dst.im = 0.0;
            }
            self.fft.process(&mut buf);

            // 2) |FFT|² -> power spectrum
            for (p, c) in power.iter_mut().zip(&buf) {
                *p = c.re * c.re + c.im * c.im;
            }

            // 3) mel bank -> log energies
            for (mel, filt) in self.filter_bank.iter().enumerate() {
                let e: f32 = filt.iter().zip(&power).map(|(f, p)| f * p).sum();
                out[mel * self.frames + t] = (e + LOGMEL_EPSILON).ln();
            }
        }

        Spectrogram::from_raw(self.n_mels, self.frames, out)
    }
}

// ---------- helpers --------------------------------------------------------

/// Periodic Hann window (`torch.hann_window(n, periodic=True)`).
pub(crate) fn periodic_hann(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n as f32).cos())
        .collect()
}

/// Mirror `pad` samples on each side, edge sample excluded.
fn reflect_pad(x: &[f32], pad: usize) -> Vec<f32> {
    let n = x.len();
    let mut out = Vec::with_capacity(n + 2 * pad);
    out.extend((1..=pad).rev().map(|i| x[i.min(n - 1)]));
    out.extend_from_slice(x);
    out.extend((1..=pad).map(|i| x[n.saturating_sub(1 + i)]));
    out
}

/// HTK-scale triangular filters over `n_freqs` linear bins, no area norm.
fn htk_mel_filter_bank(sr: usize, n_freqs: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let f_max = (sr / 2) as f32;
    let m_min = hz_to_mel(0.0);
    let m_max = hz_to_mel(f_max);

    let all_freqs: Vec<f32> = (0..n_freqs)
        .map(|i| f_max * i as f32 / (n_freqs - 1) as f32)
        .collect();
    let f_pts: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(m_min + (m_max - m_min) * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (left, center, right) = (f_pts[m], f_pts[m + 1], f_pts[m + 2]);
            all_freqs
                .iter()
                .map(|&f| {
                    let down = (f - left) / (center - left);
                    let up = (right - f) / (right - center);
                    down.min(up).max(0.0)
                })
                .collect()
        })
        .collect()
}

#[inline]
fn hz_to_mel(f: f32) -> f32 {
    2595.0 * (1.0 + f / 700.0).log10()
}

#[inline]
fn mel_to_hz(m: f32) -> f32 {
    700.0 * (10f32.powf(m / 2595.0) - 1.0)
}
