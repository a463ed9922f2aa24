//! Phase-vocoder time stretch and the pitch shift built on top of it.

use std::{f32::consts::PI, sync::Arc};

use rustfft::{Fft, FftPlanner, num_complex::Complex32};

use crate::{
    audio::resample::resample_by_ratio,
    constants::{STRETCH_HOP_LENGTH, STRETCH_N_FFT},
    error::Result,
    features::periodic_hann,
};

/// Window-sum values below this are treated as zero during overlap-add.
const WSS_FLOOR: f32 = 1e-8;

/// STFT / phase-vocoder / iSTFT round trip with cached FFT plans.
pub(crate) struct PhaseVocoder {
    n_fft: usize,
    hop: usize,
    window: Vec<f32>,
    fwd: Arc<dyn Fft<f32>>,
    inv: Arc<dyn Fft<f32>>,
}

impl PhaseVocoder {
    pub(crate) fn new(n_fft: usize, hop: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            n_fft,
            hop,
            window: periodic_hann(n_fft),
            fwd: planner.plan_fft_forward(n_fft),
            inv: planner.plan_fft_inverse(n_fft),
        }
    }

    /// Change duration by `1 / rate` while keeping pitch.
    ///
    /// Output holds `round(len / rate)` samples.
    pub(crate) fn stretch(&self, x: &[f32], rate: f32) -> Vec<f32> {
        if x.is_empty() || (rate - 1.0).abs() < f32::EPSILON {
            return x.to_vec();
        }
        let out_len = (x.len() as f32 / rate).round() as usize;
        let spec = self.stft(x);
        let stretched = self.vocode(&spec, rate);
        self.istft(&stretched, out_len)
    }

    /// Centred (zero-padded) STFT, `[frame][bin]`, bins `0..=n_fft/2`.
    fn stft(&self, x: &[f32]) -> Vec<Vec<Complex32>> {
        let half = self.n_fft / 2;
        let mut padded = vec![0f32; x.len() + self.n_fft];
        padded[half..half + x.len()].copy_from_slice(x);

        let n_frames = 1 + x.len() / self.hop;
        let mut buf = vec![Complex32::new(0.0, 0.0); self.n_fft];
        (0..n_frames)
            .map(|t| {
                let start = t * self.hop;
                for (dst, (&s, &w)) in buf
                    .iter_mut()
                    .zip(padded[start..start + self.n_fft].iter().zip(&self.window))
                {
                    *dst = Complex32::new(s * w, 0.0);
                }
                self.fwd.process(&mut buf);
                buf[..=half].to_vec()
            })
            .collect()
    }

    /// Resample the frame axis by `rate`, accumulating phase per bin.
    fn vocode(&self, spec: &[Vec<Complex32>], rate: f32) -> Vec<Vec<Complex32>> {
        let n_freqs = self.n_fft / 2 + 1;
        let n_frames = spec.len();
        let expected: Vec<f32> = (0..n_freqs)
            .map(|k| 2.0 * PI * self.hop as f32 * k as f32 / self.n_fft as f32)
            .collect();
        // frames past the end read as silence
        let zeros = vec![Complex32::new(0.0, 0.0); n_freqs];
        let frame = |i: usize| spec.get(i).unwrap_or(&zeros);

        let mut phase: Vec<f32> = spec[0].iter().map(|c| c.arg()).collect();
        let mut out = Vec::with_capacity((n_frames as f32 / rate).ceil() as usize);
        let mut step = 0f32;
        while (step as usize) < n_frames {
            let i = step as usize;
            let alpha = step - i as f32;
            let (a, b) = (frame(i), frame(i + 1));

            let col = (0..n_freqs)
                .map(|k| {
                    let mag = (1.0 - alpha) * a[k].norm() + alpha * b[k].norm();
                    let z = Complex32::from_polar(mag, phase[k]);

                    let mut dphi = b[k].arg() - a[k].arg() - expected[k];
                    dphi -= 2.0 * PI * (dphi / (2.0 * PI)).round();
                    phase[k] += expected[k] + dphi;
                    z
                })
                .collect();
            out.push(col);
            step += rate;
        }
        out
    }

    /// Weighted overlap-add inverse of [`stft`](Self::stft), trimmed to `length`.
    fn istft(&self, spec: &[Vec<Complex32>], length: usize) -> Vec<f32> {
        let half = self.n_fft / 2;
        let full = self.n_fft + self.hop * spec.len().saturating_sub(1);
        let mut y = vec![0f32; full];
        let mut wss = vec![0f32; full];
        let mut buf = vec![Complex32::new(0.0, 0.0); self.n_fft];
        let scale = 1.0 / self.n_fft as f32;

        for (t, col) in spec.iter().enumerate() {
            // rebuild the Hermitian spectrum of a real frame
            buf[..=half].copy_from_slice(col);
            for k in 1..half {
                buf[self.n_fft - k] = col[k].conj();
            }
            self.inv.process(&mut buf);

            let start = t * self.hop;
            for (i, (c, &w)) in buf.iter().zip(&self.window).enumerate() {
                y[start + i] += c.re * scale * w;
                wss[start + i] += w * w;
            }
        }
        for (s, &w) in y.iter_mut().zip(&wss) {
            if w > WSS_FLOOR {
                *s /= w;
            }
        }

        let mut out: Vec<f32> = y.into_iter().skip(half).take(length).collect();
        out.resize(length, 0.0);
        out
    }
}

impl Default for PhaseVocoder {
    fn default() -> Self {
        Self::new(STRETCH_N_FFT, STRETCH_HOP_LENGTH)
    }
}

/// Zero-pad or cut `x` to exactly `len` samples.
pub(crate) fn fix_length(mut x: Vec<f32>, len: usize) -> Vec<f32> {
    x.resize(len, 0.0);
    x
}

/// Shift pitch by `semitones` without changing duration.
pub(crate) fn pitch_shift(vocoder: &PhaseVocoder, x: &[f32], semitones: f32) -> Result<Vec<f32>> {
    if x.is_empty() || semitones == 0.0 {
        return Ok(x.to_vec());
    }
    let rate = 2f32.powf(-semitones / 12.0);
    let stretched = vocoder.stretch(x, rate);
    let shifted = resample_by_ratio(&stretched, rate as f64)?;
    Ok(fix_length(shifted, x.len()))
}
