//! Batch collation with optional background prefetch.
//!
//! The epoch order is fixed up front (identity or a seeded shuffle). With
//! `prefetch > 0` a single worker thread decodes and collates batches into a
//! bounded crossbeam channel and the consumer blocks on `recv`; otherwise
//! batches are collated inline. Either way batches arrive strictly in order.

use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, bounded};
use rand::{Rng, seq::SliceRandom};

use crate::{
    config::LoaderConfig,
    dataset::{Batch, Dataset},
    error::{KwsError, Result},
};

#[derive(Clone)]
pub struct DataLoader {
    dataset: Arc<dyn Dataset>,
    batch_size: usize,
    shuffle: bool,
    prefetch: usize,
}

impl DataLoader {
    pub fn new(dataset: Arc<dyn Dataset>, cfg: &LoaderConfig) -> Self {
        Self {
            dataset,
            batch_size: cfg.batch_size.max(1),
            shuffle: cfg.shuffle,
            prefetch: cfg.prefetch,
        }
    }

    /// In-order loader without prefetch, as used for evaluation splits.
    pub fn sequential(dataset: Arc<dyn Dataset>, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle: false,
            prefetch: 0,
        }
    }

    pub fn dataset(&self) -> &dyn Dataset {
        self.dataset.as_ref()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Batches per epoch; the last one may be short.
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Iterate one epoch. `rng` is only consumed when shuffling.
    pub fn epoch<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Batches> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            order.shuffle(rng);
        }
        self.batches(order)
    }

    /// Iterate one epoch in dataset order, ignoring the shuffle setting.
    pub fn in_order(&self) -> Result<Batches> {
        self.batches((0..self.dataset.len()).collect())
    }

    fn batches(&self, order: Vec<usize>) -> Result<Batches> {
        let remaining = order.len().div_ceil(self.batch_size);
        if self.prefetch == 0 {
            return Ok(Batches::Inline {
                dataset: Arc::clone(&self.dataset),
                order,
                batch_size: self.batch_size,
                cursor: 0,
            });
        }

        let (tx, rx) = bounded::<Result<Batch>>(self.prefetch);
        let dataset = Arc::clone(&self.dataset);
        let batch_size = self.batch_size;
        thread::Builder::new()
            .name("kws-loader".into())
            .spawn(move || {
                for chunk in order.chunks(batch_size) {
                    let batch = collate(dataset.as_ref(), chunk);
                    let failed = batch.is_err();
                    // receiver gone: the consumer stopped early
                    if tx.send(batch).is_err() || failed {
                        return;
                    }
                }
            })?;
        Ok(Batches::Prefetched { rx, remaining })
    }
}

fn collate(dataset: &dyn Dataset, indices: &[usize]) -> Result<Batch> {
    let mut batch = Batch::with_capacity(indices.len());
    for &i in indices {
        batch.push(dataset.get(i)?);
    }
    Ok(batch)
}

/// One epoch's worth of batches.
pub enum Batches {
    Inline {
        dataset: Arc<dyn Dataset>,
        order: Vec<usize>,
        batch_size: usize,
        cursor: usize,
    },
    Prefetched {
        rx: Receiver<Result<Batch>>,
        remaining: usize,
    },
}

impl Iterator for Batches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Inline {
                dataset,
                order,
                batch_size,
                cursor,
            } => {
                if *cursor >= order.len() {
                    return None;
                }
                let end = (*cursor + *batch_size).min(order.len());
                let batch = collate(dataset.as_ref(), &order[*cursor..end]);
                *cursor = end;
                Some(batch)
            }
            Self::Prefetched { rx, remaining } => {
                if *remaining == 0 {
                    return None;
                }
                *remaining -= 1;
                match rx.recv() {
                    Ok(batch) => {
                        if batch.is_err() {
                            *remaining = 0;
                        }
                        Some(batch)
                    }
                    Err(_) => {
                        *remaining = 0;
                        Some(Err(KwsError::LoaderDisconnected))
                    }
                }
            }
        }
    }
}
