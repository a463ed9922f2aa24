//! Single-point mono resampler used by WAV loading and pitch shifting.
//!
//! Host-side only (rubato is pure-CPU); callers feed/consume plain `Vec<f32>`.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::error::Result;

/// Resample `input` from `sr_in` to `sr_out` Hz.
pub fn resample_mono(input: &[f32], sr_in: usize, sr_out: usize) -> Result<Vec<f32>> {
    if sr_in == sr_out || input.is_empty() {
        return Ok(input.to_vec());
    }
    resample_by_ratio(input, sr_out as f64 / sr_in as f64)
}

/// Resample by an arbitrary `ratio = out_rate / in_rate`.
///
/// The whole clip is processed as a single chunk, then the resampler is
/// flushed and its output delay dropped, so sample `i` of the input lines up
/// with sample `i × ratio` of the output. The output holds exactly
/// `round(input.len() × ratio)` samples.
pub fn resample_by_ratio(input: &[f32], ratio: f64) -> Result<Vec<f32>> {
    if input.is_empty() || (ratio - 1.0).abs() < f64::EPSILON {
        return Ok(input.to_vec());
    }
    let mut resampler = FastFixedIn::<f32>::new(
        ratio,                    // out / in
        1.0,                      // fixed ratio, never adjusted
        PolynomialDegree::Cubic,  // quality setting
        input.len(),              // one chunk = whole clip
        1,                        // mono
    )?;
    let delay = resampler.output_delay();
    let expected = (input.len() as f64 * ratio).round() as usize;

    let mut out: Vec<f32> = resampler
        .process(&[input], None)?
        .pop()
        .unwrap_or_default();
    // drain the tail still held back by the delay line
    while out.len() < delay + expected {
        let tail = resampler
            .process_partial::<&[f32]>(None, None)?
            .pop()
            .unwrap_or_default();
        if tail.is_empty() {
            break;
        }
        out.extend(tail);
    }

    let mut aligned: Vec<f32> = out.into_iter().skip(delay).take(expected).collect();
    aligned.resize(expected, 0.0);
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_identity() {
        let x = vec![0.1, -0.2, 0.3];
        assert_eq!(resample_mono(&x, 16_000, 16_000).unwrap(), x);
    }

    #[test]
    fn output_length_follows_the_ratio_exactly() {
        let x: Vec<f32> = (0..4_000).map(|i| (i as f32 * 0.02).sin()).collect();
        assert_eq!(resample_by_ratio(&x, 2.0).unwrap().len(), 8_000);
        assert_eq!(resample_by_ratio(&x, 0.5).unwrap().len(), 2_000);
        assert_eq!(resample_by_ratio(&x, 0.8909).unwrap().len(), 3_564);
    }

    #[test]
    fn resampled_pulse_stays_in_place() {
        // a short smooth bump centred at sample 1000
        let x: Vec<f32> = (0..4_000)
            .map(|i| {
                let d = (i as f32 - 1_000.0) / 20.0;
                (-d * d).exp()
            })
            .collect();
        for ratio in [2.0, 0.5] {
            let y = resample_by_ratio(&x, ratio).unwrap();
            let peak = (0..y.len())
                .max_by(|&a, &b| y[a].total_cmp(&y[b]))
                .unwrap();
            let want = (1_000.0 * ratio) as isize;
            assert!(
                (peak as isize - want).abs() <= 2,
                "ratio {ratio}: peak at {peak}, want {want}"
            );
        }
    }

    #[test]
    fn upsampling_doubles_length_roughly() {
        let x: Vec<f32> = (0..8_000).map(|i| (i as f32 * 0.01).sin()).collect();
        let y = resample_mono(&x, 8_000, 16_000).unwrap();
        let expected = 16_000isize;
        assert!(
            (y.len() as isize - expected).abs() < 64,
            "got {} samples",
            y.len()
        );
    }
}
