//! Training loop: per-step learning rate, augment → extract → classify →
//! loss → backward → step, with per-epoch validation.

use candle_nn::VarMap;
use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;

use crate::{
    config::KwsConfig,
    error::{KwsError, Result},
    evaluate::{EvalReport, Evaluator, check_logits, correct_count},
    loader::DataLoader,
    model::Classifier,
    optim::KwsOptimizer,
    preprocess::Preprocessor,
    schedule::ScheduleState,
};

/* ───────────────────────── metrics ───────────────────────── */

/// Running loss / accuracy for one pass. Created at epoch start, finalized
/// at epoch end.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metrics {
    summed_loss: f64,
    correct: usize,
    total: usize,
    batches: usize,
}

impl Metrics {
    pub fn update(&mut self, batch_loss: f64, correct: usize, count: usize) {
        self.summed_loss += batch_loss;
        self.correct += correct;
        self.total += count;
        self.batches += 1;
    }

    /// `(mean loss per batch, accuracy %)`; zeros before the first update.
    pub fn finalize(&self) -> (f64, f64) {
        if self.batches == 0 || self.total == 0 {
            return (0.0, 0.0);
        }
        (
            self.summed_loss / self.batches as f64,
            100.0 * self.correct as f64 / self.total as f64,
        )
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn batches(&self) -> usize {
        self.batches
    }
}

/// Per-epoch curves of a full run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct History {
    pub train_losses: Vec<f64>,
    pub valid_losses: Vec<f64>,
    pub train_accs: Vec<f64>,
    pub valid_accs: Vec<f64>,
    pub best_valid_acc: f64,
    /// 1-based epoch that reached `best_valid_acc`.
    pub best_epoch: Option<usize>,
}

impl History {
    pub fn epochs(&self) -> usize {
        self.train_losses.len()
    }

    fn record(&mut self, epoch: usize, train: (f64, f64), valid: &EvalReport) {
        self.train_losses.push(train.0);
        self.train_accs.push(train.1);
        self.valid_losses.push(valid.loss);
        self.valid_accs.push(valid.accuracy);
        if self.best_epoch.is_none() || valid.accuracy > self.best_valid_acc {
            self.best_valid_acc = valid.accuracy;
            self.best_epoch = Some(epoch);
        }
    }
}

/* ───────────────────────── trainer ───────────────────────── */

/// Owns the model, optimizer, schedule and the seeded RNG of a run.
pub struct Trainer<C: Classifier> {
    model: C,
    preprocessor: Preprocessor,
    optimizer: KwsOptimizer,
    schedule: ScheduleState,
    train: DataLoader,
    valid: DataLoader,
    rng: StdRng,
    epochs: usize,
    log_every: usize,
    augment_validation: bool,
}

impl<C: Classifier> Trainer<C> {
    /// `varmap` must hold the parameters `model` was built from.
    pub fn new(
        cfg: &KwsConfig,
        model: C,
        varmap: &VarMap,
        preprocessor: Preprocessor,
        train: DataLoader,
        valid: DataLoader,
    ) -> Result<Self> {
        // both splits are checked before any step runs
        for split in [&train, &valid] {
            if split.dataset().is_empty() {
                return Err(KwsError::EmptyDataset(split.dataset().name().to_owned()));
            }
        }
        let schedule = ScheduleState::from_config(&cfg.schedule, train.num_batches());
        let optimizer = KwsOptimizer::new(&cfg.optimizer, varmap.all_vars(), schedule.current_lr())?;
        log::info!(
            "trainer: {} steps/epoch, {} epochs, warmup {} steps, optimizer {}",
            train.num_batches(),
            cfg.schedule.epochs,
            schedule.warmup_iterations(),
            cfg.optimizer.kind
        );
        Ok(Self {
            model,
            preprocessor,
            optimizer,
            schedule,
            train,
            valid,
            rng: StdRng::seed_from_u64(cfg.seed),
            epochs: cfg.schedule.epochs,
            log_every: cfg.log_every.max(1),
            augment_validation: cfg.augment.augment_validation,
        })
    }

    pub fn model(&self) -> &C {
        &self.model
    }

    pub fn into_model(self) -> C {
        self.model
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn schedule(&self) -> &ScheduleState {
        &self.schedule
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    /// One pass over the training split in train mode. Returns
    /// `(mean loss per batch, accuracy %)`.
    pub fn train_epoch(&mut self) -> Result<(f64, f64)> {
        let mut metrics = Metrics::default();
        for batch in self.train.epoch(&mut self.rng)? {
            let batch = batch?;

            let lr = self.schedule.advance();
            self.optimizer.set_learning_rate(lr);

            let xs = self.preprocessor.features(&batch, true, true, &mut self.rng)?;
            let ys = self.preprocessor.labels(&batch)?;
            let logits = self.model.forward_t(&xs, true)?;
            check_logits(&logits, batch.len(), self.model.num_classes())?;

            let loss = candle_nn::loss::cross_entropy(&logits, &ys)?;
            let loss_value = loss.to_scalar::<f32>()? as f64;
            metrics.update(loss_value, correct_count(&logits, &ys)?, batch.len());

            self.optimizer.backward_step(&loss)?;

            let step = self.schedule.iteration();
            if step % self.log_every == 0 {
                log::debug!("step {step}: lr={lr:.6} loss={loss_value:.4}");
            }
        }
        Ok(metrics.finalize())
    }

    /// Evaluate `loader` with the current parameters.
    pub fn evaluate(&mut self, loader: &DataLoader, augment: bool) -> Result<EvalReport> {
        Evaluator::new(&self.model, &self.preprocessor).evaluate(loader, augment, &mut self.rng)
    }

    /// All epochs, validating after each one.
    pub fn run(&mut self) -> Result<History> {
        let mut history = History::default();
        for epoch in 1..=self.epochs {
            let train = self.train_epoch()?;
            let valid = self.evaluate(&self.valid.clone(), self.augment_validation)?;
            history.record(epoch, train, &valid);

            log::info!(
                "epoch {epoch}/{}: lr={:.6} train loss {:.4} acc {:.2}% | valid loss {:.4} acc {:.2}% (best {:.2}%)",
                self.epochs,
                self.learning_rate(),
                train.0,
                train.1,
                valid.loss,
                valid.accuracy,
                history.best_valid_acc
            );
        }
        Ok(history)
    }
}
