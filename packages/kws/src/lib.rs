//! KWS – public crate root
//! =======================
//! Keyword-spotting **trainer**: log-mel front-end, two-stage augmentation
//! and a Candle training / evaluation loop.
//!
//! * [`features`] turns a waveform into a fixed-shape log-mel spectrogram.
//! * [`augment`] holds the waveform chain and SpecAugment masking.
//! * [`trainer`] / [`evaluate`] run epochs against any [`model::Classifier`].
//!
//! The library never downloads or deletes data; the `kws` binary wires a
//! [`KwsConfig`] to the Speech Commands layout on disk.
//
//  ───────────────────────────────────────────────────────────────────────────
//  lints: public surface stays documented where it matters, no unsafe.
//  ───────────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
#![allow(missing_docs)]

#[cfg(feature = "accelerate")]
extern crate accelerate_src;
#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

/* ────────────────────────  sub-modules  ─────────────────────────────── */
pub mod audio;
pub mod augment;
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod loader;
pub mod model;
pub mod optim;
pub mod preprocess;
pub mod schedule;
pub mod trainer;

/* ─────────────────────────── re-exports ──────────────────────────────── */
pub use augment::{NoisePool, SpectralAugmenter, WaveformAugmenter};
pub use config::{KwsConfig, Tau};
pub use dataset::{Batch, Dataset, InMemoryDataset, Sample, SpeechCommands};
pub use error::{KwsError, Result};
pub use evaluate::{EvalReport, Evaluator};
pub use features::{FeatureExtractor, Spectrogram, pad_to_length};
pub use loader::DataLoader;
pub use model::{BcResNet, Classifier};
pub use optim::{KwsOptimizer, MomentumSgd, ParamsSgd};
pub use preprocess::Preprocessor;
pub use schedule::{LearningRateScheduler, ScheduleState};
pub use trainer::{History, Metrics, Trainer};
