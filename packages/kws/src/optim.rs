//! Parameter-update rules.
//!
//! [`MomentumSgd`] is the default (momentum 0.9, weight decay 1e-3) and
//! implements `candle_nn::Optimizer` so it plugs in wherever candle's own
//! optimizers do. [`KwsOptimizer`] picks between it and candle's `AdamW`.

use candle_core::{Tensor, Var, backprop::GradStore};
use candle_nn::{
    Optimizer,
    optim::{AdamW, ParamsAdamW},
};

use crate::{
    config::{OptimizerConfig, OptimizerKind},
    error::Result,
};

/// Hyper-parameters of [`MomentumSgd`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamsSgd {
    pub lr: f64,
    pub momentum: f64,
    pub weight_decay: f64,
}

impl Default for ParamsSgd {
    fn default() -> Self {
        Self {
            lr: 0.1,
            momentum: 0.9,
            weight_decay: 1e-3,
        }
    }
}

/// SGD with heavy-ball momentum and L2 weight decay (PyTorch semantics):
///
/// ```text
/// g   ← ∇w + wd · w
/// buf ← momentum · buf + g
/// w   ← w − lr · buf
/// ```
#[derive(Debug)]
pub struct MomentumSgd {
    // (parameter, velocity)
    vars: Vec<(Var, Var)>,
    params: ParamsSgd,
}

impl Optimizer for MomentumSgd {
    type Config = ParamsSgd;

    fn new(vars: Vec<Var>, params: ParamsSgd) -> candle_core::Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|v| v.dtype().is_float())
            .map(|v| {
                let velocity = Var::zeros(v.shape(), v.dtype(), v.device())?;
                Ok((v, velocity))
            })
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self { vars, params })
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }

    fn step(&mut self, grads: &GradStore) -> candle_core::Result<()> {
        let ParamsSgd {
            lr,
            momentum,
            weight_decay,
        } = self.params;
        for (var, velocity) in &self.vars {
            // frozen or unused parameters have no gradient
            let Some(grad) = grads.get(var) else {
                continue;
            };
            let grad = if weight_decay != 0.0 {
                (grad + (var.as_tensor() * weight_decay)?)?
            } else {
                grad.clone()
            };
            let update = if momentum != 0.0 {
                ((velocity.as_tensor() * momentum)? + &grad)?
            } else {
                grad
            };
            velocity.set(&update)?;
            var.set(&var.sub(&(update * lr)?)?)?;
        }
        Ok(())
    }
}

/* ───────────────────────── selection ───────────────────────── */

/// Optimizer chosen by [`OptimizerConfig::kind`].
pub enum KwsOptimizer {
    Sgd(MomentumSgd),
    AdamW(AdamW),
}

impl KwsOptimizer {
    pub fn new(cfg: &OptimizerConfig, vars: Vec<Var>, lr: f64) -> Result<Self> {
        Ok(match cfg.kind {
            OptimizerKind::Sgd => Self::Sgd(MomentumSgd::new(
                vars,
                ParamsSgd {
                    lr,
                    momentum: cfg.momentum,
                    weight_decay: cfg.weight_decay,
                },
            )?),
            OptimizerKind::AdamW => Self::AdamW(AdamW::new(
                vars,
                ParamsAdamW {
                    lr,
                    weight_decay: cfg.weight_decay,
                    ..Default::default()
                },
            )?),
        })
    }

    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::Sgd(o) => o.learning_rate(),
            Self::AdamW(o) => o.learning_rate(),
        }
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        match self {
            Self::Sgd(o) => o.set_learning_rate(lr),
            Self::AdamW(o) => o.set_learning_rate(lr),
        }
    }

    /// Backward through `loss`, one update, gradients dropped on return.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        match self {
            Self::Sgd(o) => o.backward_step(loss)?,
            Self::AdamW(o) => o.backward_step(loss)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device};

    use super::*;

    fn scalar(v: &Var) -> f32 {
        v.as_tensor().to_vec1::<f32>().unwrap()[0]
    }

    #[test]
    fn plain_sgd_step_matches_hand_computation() {
        let w = Var::new(&[2.0f32], &Device::Cpu).unwrap();
        let mut opt = MomentumSgd::new(
            vec![w.clone()],
            ParamsSgd {
                lr: 0.1,
                momentum: 0.0,
                weight_decay: 0.0,
            },
        )
        .unwrap();
        // loss = w², d/dw = 2w = 4
        let loss = w.as_tensor().sqr().unwrap().sum_all().unwrap();
        opt.backward_step(&loss).unwrap();
        assert!((scalar(&w) - 1.6).abs() < 1e-6);
    }

    #[test]
    fn momentum_and_weight_decay_accumulate() {
        let w = Var::new(&[1.0f32], &Device::Cpu).unwrap();
        let mut opt = MomentumSgd::new(
            vec![w.clone()],
            ParamsSgd {
                lr: 0.1,
                momentum: 0.9,
                weight_decay: 0.5,
            },
        )
        .unwrap();
        // loss = 3w → grad 3; with decay g = 3 + 0.5w
        for _ in 0..2 {
            let loss = (w.as_tensor() * 3.0).unwrap().sum_all().unwrap();
            opt.backward_step(&loss).unwrap();
        }
        // step 1: g=3.5, buf=3.5, w=0.65
        // step 2: g=3.325, buf=0.9*3.5+3.325=6.475, w=0.65-0.6475=0.0025
        assert!((scalar(&w) - 0.0025).abs() < 1e-5, "w={}", scalar(&w));
    }

    #[test]
    fn learning_rate_is_settable_through_the_wrapper() {
        let w = Var::zeros(3, DType::F32, &Device::Cpu).unwrap();
        for kind in [OptimizerKind::Sgd, OptimizerKind::AdamW] {
            let cfg = OptimizerConfig {
                kind,
                ..Default::default()
            };
            let mut opt = KwsOptimizer::new(&cfg, vec![w.clone()], 0.1).unwrap();
            assert_eq!(opt.learning_rate(), 0.1);
            opt.set_learning_rate(0.02);
            assert_eq!(opt.learning_rate(), 0.02);
        }
    }
}
