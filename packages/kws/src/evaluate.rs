//! Read-only accuracy / loss pass over a dataset split.

use candle_core::{DType, Tensor};
use rand::Rng;
use serde::Serialize;

use crate::{
    error::{KwsError, Result},
    loader::DataLoader,
    model::Classifier,
    preprocess::Preprocessor,
    trainer::Metrics,
};

/// Outcome of one evaluation pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EvalReport {
    /// Top-1 accuracy in percent, `[0, 100]`.
    pub accuracy: f64,
    /// Mean of the per-batch losses.
    pub loss: f64,
    pub samples: usize,
}

/// Borrowing evaluator: eval-mode forward passes, no parameter updates,
/// SpecAugment never applied.
pub struct Evaluator<'a, C: Classifier + ?Sized> {
    model: &'a C,
    preprocessor: &'a Preprocessor,
}

impl<'a, C: Classifier + ?Sized> Evaluator<'a, C> {
    pub fn new(model: &'a C, preprocessor: &'a Preprocessor) -> Self {
        Self {
            model,
            preprocessor,
        }
    }

    /// One in-order pass over `loader`'s dataset. Waveform augmentation runs
    /// only when `augment` is set. An empty split fails with
    /// [`KwsError::EmptyDataset`].
    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        loader: &DataLoader,
        augment: bool,
        rng: &mut R,
    ) -> Result<EvalReport> {
        let dataset = loader.dataset();
        if dataset.is_empty() {
            return Err(KwsError::EmptyDataset(dataset.name().to_owned()));
        }

        let mut metrics = Metrics::default();
        for batch in loader.in_order()? {
            let batch = batch?;
            let xs = self.preprocessor.features(&batch, augment, false, rng)?;
            let ys = self.preprocessor.labels(&batch)?;
            let logits = self.model.forward_t(&xs, false)?;
            check_logits(&logits, batch.len(), self.model.num_classes())?;

            let loss = candle_nn::loss::cross_entropy(&logits, &ys)?;
            metrics.update(
                loss.to_scalar::<f32>()? as f64,
                correct_count(&logits, &ys)?,
                batch.len(),
            );
        }

        let (loss, accuracy) = metrics.finalize();
        Ok(EvalReport {
            accuracy,
            loss,
            samples: metrics.total(),
        })
    }
}

/// Logits must be exactly `[batch, classes]`.
pub(crate) fn check_logits(logits: &Tensor, batch: usize, classes: usize) -> Result<()> {
    let expected = [batch, classes];
    if logits.dims() != expected {
        return Err(KwsError::ShapeMismatch {
            expected: expected.to_vec(),
            got: logits.dims().to_vec(),
        });
    }
    Ok(())
}

/// Top-1 hits of `logits` against `labels`.
pub(crate) fn correct_count(logits: &Tensor, labels: &Tensor) -> Result<usize> {
    let hits = logits
        .argmax(1)?
        .eq(labels)?
        .to_dtype(DType::F32)?
        .sum_all()?
        .to_scalar::<f32>()?;
    Ok(hits.round() as usize)
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    #[test]
    fn correct_count_uses_argmax() {
        let logits = Tensor::new(&[[2.0f32, 1.0], [0.0, 3.0], [5.0, -1.0]], &Device::Cpu).unwrap();
        let labels = Tensor::new(&[0u32, 1, 1], &Device::Cpu).unwrap();
        assert_eq!(correct_count(&logits, &labels).unwrap(), 2);
    }

    #[test]
    fn wrong_logit_shape_is_reported() {
        let logits = Tensor::zeros((4, 3), DType::F32, &Device::Cpu).unwrap();
        let err = check_logits(&logits, 4, 12).unwrap_err();
        match err {
            KwsError::ShapeMismatch { expected, got } => {
                assert_eq!(expected, vec![4, 12]);
                assert_eq!(got, vec![4, 3]);
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
