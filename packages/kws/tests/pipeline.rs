//! Front-end and augmentation properties over realistic 2 s clips.

use kws::{
    FeatureExtractor, KwsError, NoisePool, SpectralAugmenter, WaveformAugmenter,
    audio::mean_square,
    config::{AugmentConfig, FeatureConfig, Span, SpecAugmentConfig, StageConfig, Tau},
    pad_to_length,
    schedule::{ScheduleState, cosine_lr, warmup_lr},
};
use rand::{SeedableRng, rngs::StdRng};

fn speechy(len: usize, seed: u64) -> Vec<f32> {
    let f0 = 120.0 + 40.0 * seed as f32;
    (0..len)
        .map(|i| {
            let t = i as f32 / 16_000.0;
            let env = (std::f32::consts::PI * t / (len as f32 / 16_000.0)).sin();
            0.3 * env
                * ((2.0 * std::f32::consts::PI * f0 * t).sin()
                    + 0.5 * (2.0 * std::f32::consts::PI * 3.0 * f0 * t).sin())
        })
        .collect()
}

fn alternating(amp: f32, len: usize) -> Vec<f32> {
    (0..len).map(|i| if i % 2 == 0 { amp } else { -amp }).collect()
}

#[test]
fn frame_count_does_not_depend_on_clip_length() {
    let fx = FeatureExtractor::new(&FeatureConfig::default()).unwrap();
    let shapes: Vec<_> = [1_000, 9_999, 16_000, 25_000, 32_000]
        .into_iter()
        .map(|len| fx.extract(&speechy(len, 1)).unwrap().shape())
        .collect();
    assert!(shapes.iter().all(|&s| s == (40, 201)), "{shapes:?}");
}

#[test]
fn clip_longer_than_two_seconds_is_rejected() {
    let fx = FeatureExtractor::new(&FeatureConfig::default()).unwrap();
    assert!(matches!(
        fx.extract(&speechy(32_500, 2)),
        Err(KwsError::LengthExceeded { len: 32_500, max: 32_000 })
    ));
}

#[test]
fn padding_twice_equals_padding_once() {
    let x = speechy(12_345, 3);
    let once = pad_to_length(&x, 32_000).unwrap().into_owned();
    let twice = pad_to_length(&once, 32_000).unwrap().into_owned();
    assert_eq!(once, twice);
}

#[test]
fn padding_commutes_with_a_no_op_augmentation_chain() {
    let fx = FeatureExtractor::new(&FeatureConfig::default()).unwrap();
    let aug = WaveformAugmenter::identity();
    let mut rng = StdRng::seed_from_u64(8);

    for len in [4_000, 20_000, 32_000] {
        let x = speechy(len, 4);
        let augmented_then_padded = fx.extract(&aug.apply(&x, 1, &mut rng).unwrap()).unwrap();
        let padded = pad_to_length(&x, fx.clip_samples()).unwrap();
        let padded_then_augmented = fx
            .extract(&aug.apply(&padded, 1, &mut rng).unwrap())
            .unwrap();
        assert_eq!(augmented_then_padded, padded_then_augmented, "len={len}");
    }
}

#[test]
fn background_noise_on_silence_stays_within_pool_energy() {
    // every window of either clip has power 0.01 or 0.04
    let pool = NoisePool::new(vec![alternating(0.1, 501), alternating(0.2, 40_000)]).unwrap();
    let cfg = AugmentConfig {
        background_noise: StageConfig {
            probability: Span::new(1.0, 1.0),
            magnitude: Span::new(5.0, 20.0),
        },
        ..AugmentConfig::identity()
    };
    let aug = WaveformAugmenter::new(&cfg, Some(pool)).unwrap();

    let silence = vec![0.0f32; 32_000];
    for seed in 0..20 {
        let out = aug
            .apply(&silence, 3, &mut StdRng::seed_from_u64(seed))
            .unwrap();
        let power = mean_square(&out);
        assert!(
            (0.01 - 1e-4..=0.04 + 1e-4).contains(&power),
            "seed {seed}: power {power}"
        );
    }
}

#[test]
fn full_default_chain_keeps_two_second_clips_extractable() {
    let pool = NoisePool::new(vec![speechy(48_000, 9)]).unwrap();
    let aug = WaveformAugmenter::new(&AugmentConfig::default(), Some(pool)).unwrap();
    let fx = FeatureExtractor::new(&FeatureConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(21);
    for label in 0..6 {
        let out = aug.apply(&speechy(32_000, label as u64), label, &mut rng).unwrap();
        assert_eq!(out.len(), 32_000);
        assert!(out.iter().all(|s| s.is_finite()));
        assert_eq!(fx.extract(&out).unwrap().shape(), (40, 201));
    }
}

#[test]
fn tau_one_leaves_spectrograms_alone() {
    let fx = FeatureExtractor::new(&FeatureConfig::default()).unwrap();
    let spec = fx.extract(&speechy(32_000, 5)).unwrap();
    let cfg = SpecAugmentConfig {
        time_mask_num: 2,
        ..Default::default()
    };
    let aug = SpectralAugmenter::new(Tau::X1, &cfg);
    let mut rng = StdRng::seed_from_u64(0);
    for _ in 0..25 {
        assert_eq!(aug.apply(&spec, &mut rng), spec);
    }
}

#[test]
fn tau_eight_masks_at_most_seven_bins() {
    let fx = FeatureExtractor::new(&FeatureConfig::default()).unwrap();
    let spec = fx.extract(&speechy(32_000, 6)).unwrap();
    let aug = SpectralAugmenter::new(Tau::X8, &SpecAugmentConfig::default());
    let mut rng = StdRng::seed_from_u64(13);
    for _ in 0..100 {
        let out = aug.apply(&spec, &mut rng);
        let masked = (0..spec.n_mels())
            .filter(|&m| out.band(m) != spec.band(m))
            .count();
        assert!(masked <= 7, "{masked} bins masked");
    }
}

#[test]
fn schedule_boundaries_hold_across_shapes() {
    for (steps, epochs, warmup_epochs, floor) in [(10, 20, 5, 0.0), (3, 7, 1, 1e-3), (1, 4, 0, 0.0)] {
        let total = steps * epochs;
        let warmup = steps * warmup_epochs;
        let s = ScheduleState::new(total, warmup, 0.1, floor);
        assert_eq!(s.lr_at(0), if warmup == 0 { 0.1 } else { 0.0 });
        assert!((s.lr_at(total) - floor).abs() < 1e-12);
        if warmup > 0 {
            let below = warmup_lr(warmup, warmup, 0.1);
            let above = cosine_lr(warmup, warmup, total, 0.1, floor);
            assert!((below - above).abs() < 1e-12);
        }
    }
}
