//! End-to-end training on a tiny synthetic two-class problem.

use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use kws::{
    BcResNet, Classifier, DataLoader, Dataset, Evaluator, FeatureExtractor, InMemoryDataset, KwsConfig,
    KwsError, NoisePool, Preprocessor, Sample, SpectralAugmenter, SpeechCommands, Tau, Trainer,
    WaveformAugmenter, audio::write_wav_mono, config::LoaderConfig,
};
use rand::{SeedableRng, rngs::StdRng};

const CLIP: usize = 32_000;

fn tone(freq: f32, phase: f32) -> Vec<f32> {
    (0..CLIP)
        .map(|i| 0.2 * (2.0 * std::f32::consts::PI * freq * i as f32 / 16_000.0 + phase).sin())
        .collect()
}

/// 2 classes × 4 exact-length clips: low tones vs. high tones.
fn two_class_set(name: &str) -> InMemoryDataset {
    let samples = (0..4)
        .flat_map(|i| {
            let phase = i as f32 * 0.7;
            [
                Sample::new(tone(300.0 + 20.0 * i as f32, phase), 0),
                Sample::new(tone(2_500.0 + 50.0 * i as f32, phase), 1),
            ]
        })
        .collect();
    InMemoryDataset::new(name, samples)
}

fn tiny_config() -> KwsConfig {
    let mut cfg = KwsConfig {
        tau: Tau::X1,
        gpu: None,
        seed: 17,
        log_every: 1,
        ..Default::default()
    };
    cfg.schedule.epochs = 2;
    cfg.schedule.warmup_epochs = 1;
    cfg.loader = LoaderConfig {
        batch_size: 2,
        shuffle: true,
        prefetch: 1,
    };
    cfg
}

fn preprocessor(cfg: &KwsConfig) -> Preprocessor {
    let pool = NoisePool::new(vec![tone(1_000.0, 0.0)]).unwrap();
    Preprocessor::new(
        FeatureExtractor::new(&cfg.features).unwrap(),
        WaveformAugmenter::new(&cfg.augment, Some(pool)).unwrap(),
        SpectralAugmenter::new(cfg.tau, &cfg.spec_augment),
        Device::Cpu,
    )
}

#[test]
fn two_epoch_run_returns_aligned_histories() {
    let cfg = tiny_config();
    cfg.validate().unwrap();

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = BcResNet::new(cfg.tau, 2, vb).unwrap();

    let train = DataLoader::new(Arc::new(two_class_set("train")), &cfg.loader);
    let valid = DataLoader::sequential(Arc::new(two_class_set("valid")), 2);
    let mut trainer =
        Trainer::new(&cfg, model, &varmap, preprocessor(&cfg), train, valid).unwrap();

    let history = trainer.run().unwrap();

    assert_eq!(history.train_losses.len(), 2);
    assert_eq!(history.valid_losses.len(), 2);
    assert_eq!(history.train_accs.len(), 2);
    assert_eq!(history.valid_accs.len(), 2);
    for acc in history.train_accs.iter().chain(&history.valid_accs) {
        assert!((0.0..=100.0).contains(acc), "accuracy {acc}");
    }
    for loss in history.train_losses.iter().chain(&history.valid_losses) {
        assert!(loss.is_finite() && *loss >= 0.0, "loss {loss}");
    }
    assert!(history.best_epoch.is_some());

    // 4 steps per epoch, warmup over the first epoch, floor at the end
    assert_eq!(trainer.schedule().iteration(), 8);
    assert_eq!(trainer.schedule().warmup_iterations(), 4);
    assert_eq!(trainer.learning_rate(), cfg.schedule.floor_lr);
}

#[test]
fn evaluator_reports_bounded_metrics() {
    let cfg = tiny_config();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = BcResNet::new(cfg.tau, 2, vb).unwrap();
    let pre = preprocessor(&cfg);
    let loader = DataLoader::sequential(Arc::new(two_class_set("eval")), 3);
    let mut rng = StdRng::seed_from_u64(0);

    for augment in [false, true] {
        let report = Evaluator::new(&model, &pre)
            .evaluate(&loader, augment, &mut rng)
            .unwrap();
        assert!((0.0..=100.0).contains(&report.accuracy));
        assert!(report.loss.is_finite() && report.loss >= 0.0);
        assert_eq!(report.samples, 8);
    }
}

#[test]
fn evaluating_an_empty_split_fails_fast() {
    let cfg = tiny_config();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = BcResNet::new(cfg.tau, 2, vb).unwrap();
    let pre = preprocessor(&cfg);
    let empty = DataLoader::sequential(Arc::new(InMemoryDataset::new("empty", vec![])), 4);

    let err = Evaluator::new(&model, &pre)
        .evaluate(&empty, false, &mut StdRng::seed_from_u64(0))
        .unwrap_err();
    assert!(matches!(err, KwsError::EmptyDataset(name) if name == "empty"));
}

#[test]
fn empty_validation_split_is_rejected_before_training() {
    let cfg = tiny_config();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = BcResNet::new(cfg.tau, 2, vb).unwrap();
    let before: Vec<Vec<f32>> = varmap
        .all_vars()
        .iter()
        .map(|v| v.flatten_all().unwrap().to_vec1().unwrap())
        .collect();

    let train = DataLoader::new(Arc::new(two_class_set("train")), &cfg.loader);
    let valid = DataLoader::sequential(Arc::new(InMemoryDataset::new("valid", vec![])), 2);
    let err = Trainer::new(&cfg, model, &varmap, preprocessor(&cfg), train, valid)
        .err()
        .unwrap();
    assert!(matches!(err, KwsError::EmptyDataset(ref name) if name == "valid"), "{err}");

    let after: Vec<Vec<f32>> = varmap
        .all_vars()
        .iter()
        .map(|v| v.flatten_all().unwrap().to_vec1().unwrap())
        .collect();
    assert_eq!(before, after);
}

/// Emits one logit too many per row.
struct OffByOne {
    classes: usize,
}

impl Classifier for OffByOne {
    fn forward_t(&self, xs: &Tensor, _train: bool) -> candle_core::Result<Tensor> {
        Tensor::zeros((xs.dim(0)?, self.classes + 1), DType::F32, xs.device())
    }

    fn num_classes(&self) -> usize {
        self.classes
    }
}

#[test]
fn wrong_logit_shape_aborts_the_epoch() {
    let cfg = tiny_config();
    let pre = Preprocessor::new(
        FeatureExtractor::new(&cfg.features).unwrap(),
        WaveformAugmenter::identity(),
        SpectralAugmenter::new(cfg.tau, &cfg.spec_augment),
        Device::Cpu,
    );
    let train = DataLoader::new(Arc::new(two_class_set("train")), &cfg.loader);
    let valid = DataLoader::sequential(Arc::new(two_class_set("valid")), 2);
    let mut trainer = Trainer::new(
        &cfg,
        OffByOne { classes: 2 },
        &VarMap::new(),
        pre,
        train,
        valid,
    )
    .unwrap();

    match trainer.train_epoch() {
        Err(KwsError::ShapeMismatch { expected, got }) => {
            assert_eq!(expected, vec![2, 2]);
            assert_eq!(got, vec![2, 3]);
        }
        other => panic!("expected a shape mismatch, got {other:?}"),
    }
    // the failing step never reached the optimizer
    assert_eq!(trainer.schedule().iteration(), 1);
}

#[test]
fn overlong_training_clip_aborts_the_epoch() {
    let cfg = tiny_config();
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = BcResNet::new(cfg.tau, 2, vb).unwrap();

    let mut clip = tone(400.0, 0.0);
    clip.extend_from_slice(&[0.0; 100]);
    let bad = InMemoryDataset::new("bad", vec![Sample::new(clip, 0)]);
    let pre = Preprocessor::new(
        FeatureExtractor::new(&cfg.features).unwrap(),
        WaveformAugmenter::identity(),
        SpectralAugmenter::new(cfg.tau, &cfg.spec_augment),
        Device::Cpu,
    );
    let train = DataLoader::new(Arc::new(bad), &cfg.loader);
    let valid = DataLoader::sequential(Arc::new(two_class_set("valid")), 2);
    let mut trainer = Trainer::new(&cfg, model, &varmap, pre, train, valid).unwrap();

    assert!(matches!(
        trainer.train_epoch(),
        Err(KwsError::LengthExceeded { .. })
    ));
}

#[test]
fn directory_dataset_feeds_the_loader() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("valid_12class");
    for (class, freq) in [("no", 300.0), ("yes", 2_000.0)] {
        std::fs::create_dir_all(root.join(class)).unwrap();
        for i in 0..3 {
            let path = root.join(class).join(format!("{i}.wav"));
            write_wav_mono(&path, &tone(freq, i as f32)[..16_000], 16_000).unwrap();
        }
    }

    let ds = SpeechCommands::open(&root, 16_000).unwrap();
    assert_eq!(ds.len(), 6);
    let loader = DataLoader::sequential(Arc::new(ds), 4);
    let batches: Vec<_> = loader.in_order().unwrap().map(Result::unwrap).collect();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].labels, vec![0, 0, 0, 1]);
    assert!(batches[0].waveforms.iter().all(|w| w.len() == 16_000));
}
