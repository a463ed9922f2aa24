//! Classifier interface and the bundled BC-ResNet-style CNN.
//!
//! The training loop only sees [`Classifier`]: a batch of log-mel
//! spectrograms `[B, 1, mel_bins, frames]` in, class logits `[B, classes]`
//! out. Parameters live in the `VarMap` behind the `VarBuilder` used to
//! build the model, so the optimizer owns updates and checkpointing is a
//! plain `VarMap::save`.

use candle_core::{Module, ModuleT, Tensor};
use candle_nn::{BatchNorm, BatchNormConfig, Dropout, Init, VarBuilder, init};

use crate::{config::Tau, error::Result};

/// Anything that maps a spectrogram batch to class logits.
pub trait Classifier {
    /// `train` selects train mode (batch statistics, dropout) over eval mode.
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor>;

    fn num_classes(&self) -> usize;
}

/* ───────────────────────── building blocks ───────────────────────── */

/// 2-D convolution with an arbitrary `kh × kw` kernel and "same" padding.
///
/// `candle_nn::Conv2d` only knows square kernels; the BC-ResNet block needs
/// `3×1` and `1×3` depthwise filters.
#[derive(Clone, Debug)]
struct Conv {
    weight: Tensor,
    bias: Option<Tensor>,
    pad: (usize, usize),
    stride: usize,
    groups: usize,
}

impl Conv {
    fn new(
        in_c: usize,
        out_c: usize,
        (kh, kw): (usize, usize),
        stride: usize,
        groups: usize,
        bias: bool,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let weight = vb.get_with_hints(
            (out_c, in_c / groups, kh, kw),
            "weight",
            init::DEFAULT_KAIMING_NORMAL,
        )?;
        let bias = if bias {
            Some(vb.get_with_hints(out_c, "bias", Init::Const(0.0))?)
        } else {
            None
        };
        Ok(Self {
            weight,
            bias,
            pad: (kh / 2, kw / 2),
            stride,
            groups,
        })
    }

    fn pointwise(in_c: usize, out_c: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        Self::new(in_c, out_c, (1, 1), 1, 1, false, vb)
    }
}

impl Module for Conv {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (ph, pw) = self.pad;
        let xs = xs.pad_with_zeros(2, ph, ph)?.pad_with_zeros(3, pw, pw)?;
        let ys = xs.conv2d(&self.weight, 0, self.stride, 1, self.groups)?;
        match &self.bias {
            Some(b) => ys.broadcast_add(&b.reshape((1, (), 1, 1))?),
            None => Ok(ys),
        }
    }
}

/// Conv → BatchNorm.
#[derive(Clone, Debug)]
struct ConvBn {
    conv: Conv,
    bn: BatchNorm,
}

impl ConvBn {
    fn new(conv: Conv, channels: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let bn = candle_nn::batch_norm(channels, BatchNormConfig::default(), vb.pp("bn"))?;
        Ok(Self { conv, bn })
    }
}

impl ModuleT for ConvBn {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        self.bn.forward_t(&self.conv.forward(xs)?, train)
    }
}

/// Broadcasted residual block.
///
/// * `f2`: frequency-wise depthwise `3×1` conv (the auxiliary 2-D path),
/// * `f1`: average over frequency, temporal depthwise `1×3` conv, SiLU,
///   pointwise conv, dropout; broadcast back over frequency.
///
/// Transition blocks (channel change) start with a `1×1` conv and carry no
/// identity shortcut.
#[derive(Clone, Debug)]
struct BcBlock {
    transition: Option<ConvBn>,
    freq_dw: ConvBn,
    temp_dw: ConvBn,
    pointwise: Conv,
    dropout: Dropout,
}

impl BcBlock {
    fn new(in_c: usize, out_c: usize, dropout: f32, vb: VarBuilder) -> candle_core::Result<Self> {
        let transition = if in_c != out_c {
            let conv = Conv::pointwise(in_c, out_c, vb.pp("transition"))?;
            Some(ConvBn::new(conv, out_c, vb.pp("transition"))?)
        } else {
            None
        };
        let freq = Conv::new(out_c, out_c, (3, 1), 1, out_c, false, vb.pp("freq_dw"))?;
        let temp = Conv::new(out_c, out_c, (1, 3), 1, out_c, false, vb.pp("temp_dw"))?;
        Ok(Self {
            transition,
            freq_dw: ConvBn::new(freq, out_c, vb.pp("freq_dw"))?,
            temp_dw: ConvBn::new(temp, out_c, vb.pp("temp_dw"))?,
            pointwise: Conv::pointwise(out_c, out_c, vb.pp("pointwise"))?,
            dropout: Dropout::new(dropout),
        })
    }
}

impl ModuleT for BcBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let (identity, xs) = match &self.transition {
            Some(t) => (None, t.forward_t(xs, train)?.relu()?),
            None => (Some(xs), xs.clone()),
        };

        // f2: [B, C, F, T]
        let aux = self.freq_dw.forward_t(&xs, train)?;

        // f1: [B, C, 1, T]
        let x1 = aux.mean_keepdim(2)?;
        let x1 = candle_nn::ops::silu(&self.temp_dw.forward_t(&x1, train)?)?;
        let x1 = self.pointwise.forward(&x1)?;
        let x1 = self.dropout.forward_t(&x1, train)?;

        let mut out = aux.broadcast_add(&x1)?;
        if let Some(id) = identity {
            out = (out + id)?;
        }
        out.relu()
    }
}

/* ───────────────────────── the network ───────────────────────── */

/// Compact BC-ResNet. Width scales with `tau` (`base = int(tau · 8)`).
#[derive(Clone, Debug)]
pub struct BcResNet {
    head: ConvBn,
    blocks: Vec<BcBlock>,
    tail: Conv,
    num_classes: usize,
}

impl BcResNet {
    /// Blocks per stage.
    const STAGE_DEPTHS: [usize; 4] = [1, 1, 2, 2];
    /// Stage widths as multiples of `base / 2`.
    const STAGE_WIDTHS: [usize; 4] = [2, 3, 4, 5];
    const DROPOUT: f32 = 0.1;

    pub fn new(tau: Tau, num_classes: usize, vb: VarBuilder) -> Result<Self> {
        let base = tau.base_channels();
        let half = (base / 2).max(1);
        let head_c = 2 * base;

        let head_conv = Conv::new(1, head_c, (5, 5), 2, 1, false, vb.pp("head"))?;
        let head = ConvBn::new(head_conv, head_c, vb.pp("head"))?;

        let mut blocks = Vec::new();
        let mut in_c = head_c;
        for (stage, (&depth, &mult)) in Self::STAGE_DEPTHS
            .iter()
            .zip(&Self::STAGE_WIDTHS)
            .enumerate()
        {
            let out_c = half * mult;
            for i in 0..depth {
                let vb = vb.pp(format!("stage{stage}.block{i}"));
                blocks.push(BcBlock::new(in_c, out_c, Self::DROPOUT, vb)?);
                in_c = out_c;
            }
        }

        let tail = Conv::new(in_c, num_classes, (1, 1), 1, 1, true, vb.pp("tail"))?;
        log::debug!(
            "BC-ResNet tau={} base={base} blocks={} classes={num_classes}",
            tau.value(),
            blocks.len()
        );
        Ok(Self {
            head,
            blocks,
            tail,
            num_classes,
        })
    }
}

impl Classifier for BcResNet {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let mut xs = self.head.forward_t(xs, train)?.relu()?;
        for block in &self.blocks {
            xs = block.forward_t(&xs, train)?;
        }
        // [B, classes, F', T'] → [B, classes]
        self.tail.forward(&xs)?.mean(3)?.mean(2)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}
