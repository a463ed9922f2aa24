//! Run configuration.
//!
//! [`KwsConfig`] is built once (defaults → optional TOML file → CLI
//! overrides), validated, and then only ever handed out by reference.
//! Components copy what they need at construction; nothing mutates it later.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    constants::{
        BACKGROUND_NOISE_DIR, BASE_CHANNELS_PER_TAU, DEFAULT_CLIP_SECONDS, DEFAULT_SAMPLE_RATE,
        LOGMEL_HOP_LENGTH, LOGMEL_N_FFT, LOGMEL_N_MELS, LOGMEL_WIN_LENGTH, SILENCE_LABEL,
        TRAIN_SPLIT_DIR, VALID_SPLIT_DIR,
    },
    error::{KwsError, Result},
};

/* ───────────────────────── dataset version ───────────────────────── */

/// Google Speech Commands release the run is trained on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DatasetVersion {
    V1,
    V2,
}

impl TryFrom<u8> for DatasetVersion {
    type Error = KwsError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(KwsError::config(format!(
                "dataset version must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl From<DatasetVersion> for u8 {
    fn from(v: DatasetVersion) -> Self {
        match v {
            DatasetVersion::V1 => 1,
            DatasetVersion::V2 => 2,
        }
    }
}

impl DatasetVersion {
    /// `"v0.01"` / `"v0.02"`, the suffix used by the GSC archives.
    pub fn tag(self) -> &'static str {
        match self {
            Self::V1 => "v0.01",
            Self::V2 => "v0.02",
        }
    }

    /// Archive URLs of the (train, test) releases.
    pub fn archive_urls(self) -> (String, String) {
        let base = "https://storage.googleapis.com/download.tensorflow.org/data";
        (
            format!("{base}/speech_commands_{}.tar.gz", self.tag()),
            format!("{base}/speech_commands_test_set_{}.tar.gz", self.tag()),
        )
    }
}

/* ───────────────────────── model capacity ───────────────────────── */

/// Model-capacity multiplier. Also selects the SpecAugment band width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub enum Tau {
    X1,
    X1_5,
    X2,
    X3,
    X6,
    X8,
}

impl TryFrom<f32> for Tau {
    type Error = KwsError;

    fn try_from(value: f32) -> Result<Self> {
        const TABLE: [(f32, Tau); 6] = [
            (1.0, Tau::X1),
            (1.5, Tau::X1_5),
            (2.0, Tau::X2),
            (3.0, Tau::X3),
            (6.0, Tau::X6),
            (8.0, Tau::X8),
        ];
        TABLE
            .iter()
            .find(|(t, _)| (t - value).abs() < 1e-6)
            .map(|&(_, tau)| tau)
            .ok_or_else(|| {
                KwsError::config(format!(
                    "tau must be one of 1, 1.5, 2, 3, 6, 8; got {value}"
                ))
            })
    }
}

impl From<Tau> for f32 {
    fn from(t: Tau) -> Self {
        t.value()
    }
}

impl std::str::FromStr for Tau {
    type Err = KwsError;

    fn from_str(s: &str) -> Result<Self> {
        let v: f32 = s
            .trim()
            .parse()
            .map_err(|_| KwsError::config(format!("tau is not a number: {s}")))?;
        Tau::try_from(v)
    }
}

impl Tau {
    pub fn value(self) -> f32 {
        match self {
            Self::X1 => 1.0,
            Self::X1_5 => 1.5,
            Self::X2 => 2.0,
            Self::X3 => 3.0,
            Self::X6 => 6.0,
            Self::X8 => 8.0,
        }
    }

    /// Maximum SpecAugment frequency-mask width for this capacity.
    pub fn frequency_masking_para(self) -> usize {
        match self {
            Self::X1 => 0,
            Self::X1_5 => 1,
            Self::X2 => 3,
            Self::X3 => 5,
            Self::X6 | Self::X8 => 7,
        }
    }

    /// SpecAugment only kicks in from `tau >= 1.5`.
    pub fn spec_augment_enabled(self) -> bool {
        self.value() >= 1.5
    }

    /// Classifier base width, `int(tau * 8)`.
    pub fn base_channels(self) -> usize {
        (self.value() * BASE_CHANNELS_PER_TAU) as usize
    }
}

/* ───────────────────────── sub-records ───────────────────────── */

/// Closed interval `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub min: f32,
    pub max: f32,
}

impl Span {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    fn check(&self, what: &str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min > self.max {
            return Err(KwsError::config(format!(
                "{what}: invalid range [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Log-mel front-end parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub sample_rate: usize,
    pub clip_seconds: f32,
    pub n_fft: usize,
    pub win_length: usize,
    pub hop_length: usize,
    pub n_mels: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            clip_seconds: DEFAULT_CLIP_SECONDS,
            n_fft: LOGMEL_N_FFT,
            win_length: LOGMEL_WIN_LENGTH,
            hop_length: LOGMEL_HOP_LENGTH,
            n_mels: LOGMEL_N_MELS,
        }
    }
}

impl FeatureConfig {
    /// Fixed waveform length `T = sample_rate × clip_seconds`.
    pub fn clip_samples(&self) -> usize {
        (self.sample_rate as f32 * self.clip_seconds).round() as usize
    }

    /// Frames produced by the centred STFT for a `T`-sample clip.
    pub fn frames(&self) -> usize {
        1 + self.clip_samples() / self.hop_length
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.hop_length == 0 || self.n_mels == 0 {
            return Err(KwsError::config(
                "sample_rate, hop_length and n_mels must be non-zero",
            ));
        }
        if self.win_length == 0 || self.win_length > self.n_fft {
            return Err(KwsError::config(format!(
                "win_length ({}) must be in 1..={} (n_fft)",
                self.win_length, self.n_fft
            )));
        }
        if self.clip_samples() <= self.n_fft / 2 {
            return Err(KwsError::config(format!(
                "clip of {} samples is too short for reflect padding of {}",
                self.clip_samples(),
                self.n_fft / 2
            )));
        }
        Ok(())
    }
}

/// One augmentation stage: its trigger probability range and its magnitude range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub probability: Span,
    pub magnitude: Span,
}

impl StageConfig {
    pub const fn new(magnitude: Span) -> Self {
        Self {
            probability: Span::new(0.2, 0.8),
            magnitude,
        }
    }

    /// Stage that never fires.
    pub const fn disabled(magnitude: Span) -> Self {
        Self {
            probability: Span::new(0.0, 0.0),
            magnitude,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.probability.max <= 0.0
    }

    fn validate(&self, what: &str) -> Result<()> {
        self.probability.check(what)?;
        self.magnitude.check(what)?;
        if self.probability.min < 0.0 || self.probability.max > 1.0 {
            return Err(KwsError::config(format!(
                "{what}: probability range must lie in [0, 1]"
            )));
        }
        Ok(())
    }
}

/// Time-domain augmentation chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Amplitude of additive white noise.
    pub gaussian_noise: StageConfig,
    /// Playback rate (`> 1` shortens).
    pub time_stretch: StageConfig,
    /// Pad / cut the stretched clip back to its input length.
    pub leave_length_unchanged: bool,
    /// Semitones.
    pub pitch_shift: StageConfig,
    /// Decibels.
    pub gain: StageConfig,
    /// Fraction of the clip length.
    pub shift: StageConfig,
    /// Roll samples around instead of zero-filling.
    pub shift_rollover: bool,
    /// Signal-to-noise ratio in dB.
    pub background_noise: StageConfig,
    /// Label that always receives background noise when augmenting.
    pub silence_label: Option<u32>,
    /// Run waveform augmentation during validation passes.
    pub augment_validation: bool,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            gaussian_noise: StageConfig::new(Span::new(0.001, 0.015)),
            time_stretch: StageConfig::new(Span::new(0.8, 1.3)),
            leave_length_unchanged: true,
            pitch_shift: StageConfig::new(Span::new(-2.0, 2.0)),
            gain: StageConfig::new(Span::new(-10.0, 10.0)),
            shift: StageConfig::new(Span::new(-0.5, 0.5)),
            shift_rollover: true,
            background_noise: StageConfig::new(Span::new(5.0, 20.0)),
            silence_label: Some(SILENCE_LABEL),
            augment_validation: true,
        }
    }
}

impl AugmentConfig {
    /// Chain where every stage is switched off.
    pub fn identity() -> Self {
        let d = Self::default();
        Self {
            gaussian_noise: StageConfig::disabled(d.gaussian_noise.magnitude),
            time_stretch: StageConfig::disabled(d.time_stretch.magnitude),
            pitch_shift: StageConfig::disabled(d.pitch_shift.magnitude),
            gain: StageConfig::disabled(d.gain.magnitude),
            shift: StageConfig::disabled(d.shift.magnitude),
            background_noise: StageConfig::disabled(d.background_noise.magnitude),
            silence_label: None,
            ..d
        }
    }

    /// Whether any stage needs the background-noise pool.
    pub fn needs_noise_pool(&self) -> bool {
        !self.background_noise.is_disabled() || self.silence_label.is_some()
    }

    fn validate(&self) -> Result<()> {
        self.gaussian_noise.validate("augment.gaussian_noise")?;
        self.time_stretch.validate("augment.time_stretch")?;
        self.pitch_shift.validate("augment.pitch_shift")?;
        self.gain.validate("augment.gain")?;
        self.shift.validate("augment.shift")?;
        self.background_noise.validate("augment.background_noise")?;
        if self.time_stretch.magnitude.min <= 0.0 {
            return Err(KwsError::config("augment.time_stretch: rates must be > 0"));
        }
        if self.shift.magnitude.min < -1.0 || self.shift.magnitude.max > 1.0 {
            return Err(KwsError::config(
                "augment.shift: fractions must lie in [-1, 1]",
            ));
        }
        Ok(())
    }
}

/// Value written into masked SpecAugment bands.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MaskValue {
    #[default]
    Zero,
    Mean,
}

/// SpecAugment knobs not derived from `tau`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecAugmentConfig {
    pub freq_mask_num: usize,
    pub time_mask_num: usize,
    pub time_masking_para: usize,
    pub mask_value: MaskValue,
}

impl Default for SpecAugmentConfig {
    fn default() -> Self {
        Self {
            freq_mask_num: 1,
            time_mask_num: 0,
            time_masking_para: 20,
            mask_value: MaskValue::Zero,
        }
    }
}

/// Warmup-then-cosine schedule, counted in epochs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub epochs: usize,
    pub warmup_epochs: usize,
    pub base_lr: f64,
    pub floor_lr: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            warmup_epochs: 5,
            base_lr: 1e-1,
            floor_lr: 0.0,
        }
    }
}

/// Which parameter-update rule to use.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Sgd,
    AdamW,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub kind: OptimizerKind,
    pub momentum: f64,
    pub weight_decay: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            kind: OptimizerKind::Sgd,
            momentum: 0.9,
            weight_decay: 1e-3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    /// Batches decoded ahead on a worker thread (`0` = decode inline).
    pub prefetch: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            shuffle: true,
            prefetch: 2,
        }
    }
}

/* ───────────────────────── top-level record ───────────────────────── */

/// Immutable run configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KwsConfig {
    pub version: DatasetVersion,
    pub tau: Tau,
    /// CUDA ordinal; `None` (or no CUDA build) means CPU.
    pub gpu: Option<usize>,
    /// Print the archive locations and stop; acquisition happens outside the core.
    pub download: bool,
    pub data_root: PathBuf,
    pub seed: u64,
    /// Steps between `debug!` progress lines.
    pub log_every: usize,
    pub features: FeatureConfig,
    pub augment: AugmentConfig,
    pub spec_augment: SpecAugmentConfig,
    pub schedule: ScheduleConfig,
    pub optimizer: OptimizerConfig,
    pub loader: LoaderConfig,
}

impl Default for KwsConfig {
    fn default() -> Self {
        Self {
            version: DatasetVersion::V1,
            tau: Tau::X1,
            gpu: Some(0),
            download: false,
            data_root: PathBuf::from("./data"),
            seed: 0,
            log_every: 50,
            features: FeatureConfig::default(),
            augment: AugmentConfig::default(),
            spec_augment: SpecAugmentConfig::default(),
            schedule: ScheduleConfig::default(),
            optimizer: OptimizerConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}

impl KwsConfig {
    /// Parse a TOML file; absent keys keep their defaults.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Check every invariant the core relies on. Called once at startup.
    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        self.augment.validate()?;

        let s = &self.schedule;
        if s.epochs == 0 {
            return Err(KwsError::config("schedule.epochs must be >= 1"));
        }
        if !(s.base_lr.is_finite() && s.floor_lr.is_finite()) || s.base_lr < 0.0 {
            return Err(KwsError::config("schedule: learning rates must be finite"));
        }
        if s.floor_lr > s.base_lr {
            return Err(KwsError::config(format!(
                "schedule.floor_lr ({}) exceeds base_lr ({})",
                s.floor_lr, s.base_lr
            )));
        }
        if self.loader.batch_size == 0 {
            return Err(KwsError::config("loader.batch_size must be >= 1"));
        }
        let sa = &self.spec_augment;
        if sa.time_mask_num > 0 && sa.time_masking_para > self.features.frames() {
            return Err(KwsError::config(format!(
                "spec_augment.time_masking_para ({}) exceeds the frame count ({})",
                sa.time_masking_para,
                self.features.frames()
            )));
        }
        if self.tau.frequency_masking_para() > self.features.n_mels {
            return Err(KwsError::config("frequency mask wider than the mel axis"));
        }
        Ok(())
    }

    /* ---------- dataset layout ---------- */

    /// `<root>/speech_commands_v0.0X`
    pub fn dataset_dir(&self) -> PathBuf {
        self.data_root
            .join(format!("speech_commands_{}", self.version.tag()))
    }

    /// `<root>/speech_commands_test_set_v0.0X`
    pub fn test_dir(&self) -> PathBuf {
        self.data_root
            .join(format!("speech_commands_test_set_{}", self.version.tag()))
    }

    pub fn train_dir(&self) -> PathBuf {
        self.dataset_dir().join(TRAIN_SPLIT_DIR)
    }

    pub fn valid_dir(&self) -> PathBuf {
        self.dataset_dir().join(VALID_SPLIT_DIR)
    }

    pub fn noise_dir(&self) -> PathBuf {
        self.dataset_dir().join(BACKGROUND_NOISE_DIR)
    }
}
