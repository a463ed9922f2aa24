/// DEFAULT_SAMPLE_RATE is the sample rate every waveform is normalised to before it enters the core.
pub const DEFAULT_SAMPLE_RATE: usize = 16_000;

/// DEFAULT_CLIP_SECONDS is the fixed clip duration; no sample may exceed it.
pub const DEFAULT_CLIP_SECONDS: f32 = 2.0;

/// LOGMEL_N_FFT is the FFT size of the log-mel front-end.
pub const LOGMEL_N_FFT: usize = 512;

/// LOGMEL_WIN_LENGTH is the analysis window length (30 ms @ 16 kHz).
pub const LOGMEL_WIN_LENGTH: usize = 480;

/// LOGMEL_HOP_LENGTH is the hop between frames (10 ms @ 16 kHz).
pub const LOGMEL_HOP_LENGTH: usize = 160;

/// LOGMEL_N_MELS is the number of triangular mel filters.
pub const LOGMEL_N_MELS: usize = 40;

/// LOGMEL_EPSILON is added to mel energies before the natural log.
pub const LOGMEL_EPSILON: f32 = 1e-6;

/// STRETCH_N_FFT is the FFT size used by the phase-vocoder time stretch.
pub(crate) const STRETCH_N_FFT: usize = 512;

/// STRETCH_HOP_LENGTH is the phase-vocoder hop.
pub(crate) const STRETCH_HOP_LENGTH: usize = 128;

/// BACKGROUND_MIN_RMS is the RMS under which a noise clip counts as silent and is skipped.
pub(crate) const BACKGROUND_MIN_RMS: f32 = 1e-9;

/// SILENCE_LABEL is the class id of `_silence_` in the sorted GSC label list.
pub const SILENCE_LABEL: u32 = 0;

/// BACKGROUND_NOISE_DIR is the directory name of the noise pool inside a dataset root.
pub const BACKGROUND_NOISE_DIR: &str = "_background_noise_";

/// TRAIN_SPLIT_DIR is the training split directory inside a dataset root.
pub const TRAIN_SPLIT_DIR: &str = "train_12class";

/// VALID_SPLIT_DIR is the validation split directory inside a dataset root.
pub const VALID_SPLIT_DIR: &str = "valid_12class";

/// BASE_CHANNELS_PER_TAU is the classifier width multiplier (`channels = tau * 8`).
pub const BASE_CHANNELS_PER_TAU: f32 = 8.0;
