//! **WAV decoding**
//!
//! 1. Decode any PCM / float WAV via `hound`.
//! 2. Down-mix interleaved channels to mono `f32` in `[-1, 1]`.
//! 3. Resample to the requested rate when the file disagrees.

use std::{fs::File, io::BufReader, path::Path};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::resample_mono;
use crate::error::Result;

/// Read `path` as mono `f32` at `target_rate` Hz.
pub fn read_wav_mono<P: AsRef<Path>>(path: P, target_rate: usize) -> Result<Vec<f32>> {
    let reader = WavReader::new(BufReader::new(File::open(path.as_ref())?))?;
    decode(reader, target_rate)
}

fn decode<R: std::io::Read>(mut reader: WavReader<R>, target_rate: usize) -> Result<Vec<f32>> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let mono: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        let inv = 1.0 / channels as f32;
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * inv)
            .collect()
    };

    resample_mono(&mono, spec.sample_rate as usize, target_rate)
}

/// Write mono `f32` samples as 16-bit PCM.
pub fn write_wav_mono<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: usize) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: sample_rate as u32,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path.as_ref(), spec)?;
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(v)?;
    }
    writer.finalize()?;
    Ok(())
}
