//! Per-step learning-rate schedule: linear warmup, then cosine decay.
//!
//! ```text
//! i <  warmup : base · i / warmup
//! i >= warmup : floor + ½ (base − floor) (1 + cos(π (i − warmup) / (total − warmup)))
//! ```
//!
//! `lr(0) = 0`, `lr(total) = floor`, and both branches agree at `i = warmup`.

use std::f64::consts::PI;

use crate::config::ScheduleConfig;

/// Snapshot of the schedule plus the step counter.
///
/// The counter only moves forward through [`advance`](Self::advance); the
/// training loop owns the value and everything else reads it.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleState {
    iteration: usize,
    total_iterations: usize,
    warmup_iterations: usize,
    base_lr: f64,
    floor_lr: f64,
}

/// The trainer-facing name for the same thing.
pub type LearningRateScheduler = ScheduleState;

impl ScheduleState {
    pub fn new(total_iterations: usize, warmup_iterations: usize, base_lr: f64, floor_lr: f64) -> Self {
        Self {
            iteration: 0,
            total_iterations,
            warmup_iterations,
            base_lr,
            floor_lr,
        }
    }

    /// `total = steps_per_epoch × epochs`, `warmup = steps_per_epoch × warmup_epochs`.
    pub fn from_config(cfg: &ScheduleConfig, steps_per_epoch: usize) -> Self {
        let total = steps_per_epoch * cfg.epochs;
        let warmup = steps_per_epoch * cfg.warmup_epochs;
        if warmup > total {
            log::warn!(
                "warmup ({warmup} steps) is longer than the run ({total} steps); \
                 the learning rate never leaves the ramp"
            );
        }
        Self::new(total, warmup, cfg.base_lr, cfg.floor_lr)
    }

    /// Learning rate at step `i`. Pure: no state change.
    pub fn lr_at(&self, i: usize) -> f64 {
        if i < self.warmup_iterations {
            return warmup_lr(i, self.warmup_iterations, self.base_lr);
        }
        if i >= self.total_iterations {
            return self.floor_lr;
        }
        cosine_lr(
            i,
            self.warmup_iterations,
            self.total_iterations,
            self.base_lr,
            self.floor_lr,
        )
    }

    /// Move to the next step and return its learning rate.
    pub fn advance(&mut self) -> f64 {
        self.iteration += 1;
        self.lr_at(self.iteration)
    }

    /// Learning rate at the current step.
    pub fn current_lr(&self) -> f64 {
        self.lr_at(self.iteration)
    }

    #[inline]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    #[inline]
    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    #[inline]
    pub fn warmup_iterations(&self) -> usize {
        self.warmup_iterations
    }
}

/// Linear ramp from 0 to `base` over `warmup` steps.
pub fn warmup_lr(i: usize, warmup: usize, base: f64) -> f64 {
    if warmup == 0 {
        return base;
    }
    base * i as f64 / warmup as f64
}

/// Half-cosine from `base` at `warmup` down to `floor` at `total`.
pub fn cosine_lr(i: usize, warmup: usize, total: usize, base: f64, floor: f64) -> f64 {
    if total <= warmup {
        return floor;
    }
    let progress = (i.saturating_sub(warmup)) as f64 / (total - warmup) as f64;
    floor + 0.5 * (base - floor) * (1.0 + (PI * progress.min(1.0)).cos())
}
