//! Audio I/O helpers shared by the dataset, the noise pool and the augmenter.

pub mod resample;
pub mod wav;

/* handy re-exports */
pub use resample::resample_mono;
pub use wav::{read_wav_mono, write_wav_mono};

/// Plain RMS of an f32 slice.
#[inline]
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = signal.iter().map(|s| s * s).sum();
    (sum_sq / signal.len() as f32).sqrt()
}

/// Mean power (`rms²`) of an f32 slice.
#[inline]
pub fn mean_square(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().map(|s| s * s).sum::<f32>() / signal.len() as f32
}
