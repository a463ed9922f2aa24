//! Waveform → log-mel front-end.
//!
//! * [`pad_to_length`] – the length policy (zero-pad right, refuse overlong clips).
//! * [`FeatureExtractor`] – padding + centred STFT + HTK mel bank + `ln`.
//! * [`Spectrogram`] – the `[mel_bins, frames]` matrix flowing downstream.

mod logmel;
mod spectrogram;

pub use logmel::FeatureExtractor;
pub(crate) use logmel::periodic_hann;
pub use spectrogram::Spectrogram;

use std::borrow::Cow;

use crate::error::{KwsError, Result};

/// Enforce the fixed clip length `target`.
///
/// * shorter  → right-padded with zeros,
/// * equal    → returned untouched (borrowed, bit-identical),
/// * longer   → [`KwsError::LengthExceeded`]; clips are never truncated.
pub fn pad_to_length(waveform: &[f32], target: usize) -> Result<Cow<'_, [f32]>> {
    match waveform.len().cmp(&target) {
        std::cmp::Ordering::Equal => Ok(Cow::Borrowed(waveform)),
        std::cmp::Ordering::Less => {
            let mut padded = Vec::with_capacity(target);
            padded.extend_from_slice(waveform);
            padded.resize(target, 0.0);
            Ok(Cow::Owned(padded))
        }
        std::cmp::Ordering::Greater => Err(KwsError::LengthExceeded {
            len: waveform.len(),
            max: target,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_clip_is_zero_padded() {
        let out = pad_to_length(&[1.0, 2.0], 5).unwrap();
        assert_eq!(&*out, &[1.0, 2.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn exact_clip_is_borrowed_unchanged() {
        let x = [0.25f32, -0.5, f32::MIN_POSITIVE];
        let out = pad_to_length(&x, 3).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        let bits: Vec<u32> = out.iter().map(|v| v.to_bits()).collect();
        let want: Vec<u32> = x.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits, want);
    }

    #[test]
    fn padding_is_idempotent() {
        let once = pad_to_length(&[0.3, 0.1], 6).unwrap().into_owned();
        let twice = pad_to_length(&once, 6).unwrap();
        assert_eq!(&*twice, once.as_slice());
    }

    #[test]
    fn overlong_clip_is_rejected() {
        let err = pad_to_length(&[0.0; 7], 6).unwrap_err();
        assert!(matches!(err, KwsError::LengthExceeded { len: 7, max: 6 }));
    }
}
