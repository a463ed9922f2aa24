/// Row-major `[mel_bins, frames]` matrix.
///
/// Augmentation stages never mutate a spectrogram they are handed; they
/// return a new one.
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrogram {
    n_mels: usize,
    frames: usize,
    data: Vec<f32>,
}

impl Spectrogram {
    /// Wrap `data`; `None` if its length is not `n_mels × frames`.
    pub fn new(n_mels: usize, frames: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == n_mels * frames).then_some(Self {
            n_mels,
            frames,
            data,
        })
    }

    pub(crate) fn from_raw(n_mels: usize, frames: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), n_mels * frames);
        Self {
            n_mels,
            frames,
            data,
        }
    }

    #[inline]
    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// `(mel_bins, frames)`
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.n_mels, self.frames)
    }

    #[inline]
    pub fn get(&self, mel: usize, frame: usize) -> f32 {
        self.data[mel * self.frames + frame]
    }

    /// One mel band across all frames.
    pub fn band(&self, mel: usize) -> &[f32] {
        let start = mel * self.frames;
        &self.data[start..start + self.frames]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }

    /// Copy with `bands` (mel rows) set to `value`.
    pub(crate) fn with_bands_filled(&self, bands: std::ops::Range<usize>, value: f32) -> Self {
        let mut data = self.data.clone();
        for mel in bands {
            let start = mel * self.frames;
            data[start..start + self.frames].fill(value);
        }
        Self { data, ..*self }
    }

    /// Copy with `frames` (time columns) set to `value`.
    pub(crate) fn with_frames_filled(&self, frames: std::ops::Range<usize>, value: f32) -> Self {
        let mut data = self.data.clone();
        for row in data.chunks_exact_mut(self.frames) {
            row[frames.clone()].fill(value);
        }
        Self { data, ..*self }
    }
}
