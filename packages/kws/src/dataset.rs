//! Labelled waveform collections.
//!
//! [`Dataset`] is the seam the loader pulls from. [`SpeechCommands`] reads the
//! Google Speech Commands directory layout lazily (one WAV per `get`);
//! [`InMemoryDataset`] holds decoded samples directly.

use std::path::{Path, PathBuf};

use crate::{
    audio::read_wav_mono,
    constants::BACKGROUND_NOISE_DIR,
    error::{KwsError, Result},
};

/// One labelled clip. Length is arbitrary until the feature extractor pads it.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub waveform: Vec<f32>,
    pub label: u32,
}

impl Sample {
    pub fn new(waveform: Vec<f32>, label: u32) -> Self {
        Self { waveform, label }
    }
}

/// Aligned waveforms and labels; slot `i` of both belongs to the same sample.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    pub waveforms: Vec<Vec<f32>>,
    pub labels: Vec<u32>,
}

impl Batch {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            waveforms: Vec::with_capacity(n),
            labels: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.waveforms.push(sample.waveform);
        self.labels.push(sample.label);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `(waveform, label)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&[f32], u32)> {
        self.waveforms
            .iter()
            .map(Vec::as_slice)
            .zip(self.labels.iter().copied())
    }
}

impl FromIterator<Sample> for Batch {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        let mut batch = Batch::default();
        iter.into_iter().for_each(|s| batch.push(s));
        batch
    }
}

/// Random-access source of samples, shareable with a loader thread.
pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> Result<Sample>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable split name, used in logs and errors.
    fn name(&self) -> &str {
        "dataset"
    }
}

/* ───────────────────────── in-memory ───────────────────────── */

#[derive(Clone, Debug, Default)]
pub struct InMemoryDataset {
    name: String,
    samples: Vec<Sample>,
}

impl InMemoryDataset {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            name: name.into(),
            samples,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        self.samples.get(index).cloned().ok_or_else(|| {
            KwsError::config(format!(
                "{}: index {index} out of range (len {})",
                self.name,
                self.samples.len()
            ))
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/* ───────────────────────── directory-backed ───────────────────────── */

/// `<root>/<class>/*.wav`. Class ids are the sorted class-directory names.
#[derive(Clone, Debug)]
pub struct SpeechCommands {
    root: PathBuf,
    name: String,
    labels: Vec<String>,
    items: Vec<(PathBuf, u32)>,
    sample_rate: usize,
}

impl SpeechCommands {
    /// Scan `root`, deriving the label list from its class directories.
    pub fn open<P: AsRef<Path>>(root: P, sample_rate: usize) -> Result<Self> {
        let root = root.as_ref();
        let labels = class_dirs(root)?;
        Self::with_labels(root, &labels, sample_rate)
    }

    /// Scan `root` against a fixed label list (e.g. the training split's), so
    /// every split shares one id space. A class directory that is not in
    /// `labels` is a configuration error.
    pub fn with_labels<P: AsRef<Path>>(
        root: P,
        labels: &[String],
        sample_rate: usize,
    ) -> Result<Self> {
        let root = root.as_ref();
        let mut items = Vec::new();
        for class in class_dirs(root)? {
            let label = labels.iter().position(|l| *l == class).ok_or_else(|| {
                KwsError::config(format!(
                    "class \"{class}\" in {} is not a known label",
                    root.display()
                ))
            })?;
            let mut files: Vec<PathBuf> = std::fs::read_dir(root.join(&class))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|x| x.eq_ignore_ascii_case("wav")))
                .collect();
            files.sort();
            items.extend(files.into_iter().map(|p| (p, label as u32)));
        }

        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        log::info!(
            "{name}: {} clips over {} classes",
            items.len(),
            labels.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            name,
            labels: labels.to_vec(),
            items,
            sample_rate,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path and label of item `index`.
    pub fn item(&self, index: usize) -> Option<(&Path, u32)> {
        self.items.get(index).map(|(p, l)| (p.as_path(), *l))
    }
}

impl Dataset for SpeechCommands {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let (path, label) = self.item(index).ok_or_else(|| {
            KwsError::config(format!(
                "{}: index {index} out of range (len {})",
                self.name,
                self.items.len()
            ))
        })?;
        Ok(Sample::new(read_wav_mono(path, self.sample_rate)?, label))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Sorted class-directory names under `root`, noise pool excluded.
fn class_dirs(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Err(KwsError::config(format!(
            "dataset directory {} does not exist",
            root.display()
        )));
    }
    let mut classes: Vec<String> = std::fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_owned))
        .filter(|n| n != BACKGROUND_NOISE_DIR)
        .collect();
    classes.sort();
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav_mono;

    fn touch_wav(path: &Path, len: usize) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        write_wav_mono(path, &vec![0.1; len], 16_000).unwrap();
    }

    #[test]
    fn batch_keeps_slots_aligned() {
        let batch: Batch = [Sample::new(vec![1.0], 3), Sample::new(vec![2.0, 2.0], 5)]
            .into_iter()
            .collect();
        assert_eq!(batch.len(), 2);
        let pairs: Vec<_> = batch.iter().map(|(w, l)| (w.len(), l)).collect();
        assert_eq!(pairs, vec![(1, 3), (2, 5)]);
    }

    #[test]
    fn labels_follow_sorted_directory_names() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("train_12class");
        touch_wav(&root.join("yes/b.wav"), 100);
        touch_wav(&root.join("yes/a.wav"), 200);
        touch_wav(&root.join("_silence_/s.wav"), 50);
        touch_wav(&root.join(BACKGROUND_NOISE_DIR).join("n.wav"), 10);

        let ds = SpeechCommands::open(&root, 16_000).unwrap();
        assert_eq!(ds.labels(), &["_silence_".to_string(), "yes".to_string()]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.name(), "train_12class");

        let first = ds.get(0).unwrap();
        assert_eq!((first.waveform.len(), first.label), (50, 0));
        // files sorted within a class
        assert_eq!(ds.get(1).unwrap().waveform.len(), 200);
    }

    #[test]
    fn unknown_class_in_later_split_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        touch_wav(&dir.path().join("maybe/x.wav"), 10);
        let err = SpeechCommands::with_labels(dir.path(), &["yes".into()], 16_000).unwrap_err();
        assert!(matches!(err, KwsError::Configuration(_)));
    }

    #[test]
    fn missing_root_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SpeechCommands::open(dir.path().join("absent"), 16_000).unwrap_err();
        assert!(matches!(err, KwsError::Configuration(_)));
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let ds = InMemoryDataset::new("tiny", vec![Sample::new(vec![0.0], 0)]);
        assert!(ds.get(0).is_ok());
        assert!(ds.get(1).is_err());
    }
}
