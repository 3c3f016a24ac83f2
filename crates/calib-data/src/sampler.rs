//! Random batch planning over an image pool.
//!
//! [`BatchPlan`] is the lazy, resumable sequence of calibration steps: each
//! `next()` draws `batch_size` distinct pool indices uniformly without
//! replacement. Replacement happens across batches, never within one.

use crate::loader::ImagePool;
use calib_core::{Error, Result};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::sync::Arc;

/// One planned calibration step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Zero-based step index
    pub step: usize,
    /// Distinct image paths making up the batch
    pub paths: Vec<PathBuf>,
}

/// Finite iterator of [`BatchRequest`]s
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pool: Arc<ImagePool>,
    batch_size: usize,
    num_steps: usize,
    step: usize,
    rng: ChaCha8Rng,
}

impl BatchPlan {
    /// Creates a plan of `num_steps` batches.
    ///
    /// `seed` fixes the sampled subsets; `None` seeds from OS entropy. Fails
    /// when batches are requested from a pool smaller than `batch_size`.
    pub fn new(
        pool: Arc<ImagePool>,
        batch_size: usize,
        num_steps: usize,
        seed: Option<u64>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidArgument("batch size must be at least 1".to_string()));
        }

        if num_steps > 0 && pool.len() < batch_size {
            return Err(Error::Dataset(format!(
                "image pool holds {} images, a batch needs {} distinct images",
                pool.len(),
                batch_size
            )));
        }

        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Ok(Self {
            pool,
            batch_size,
            num_steps,
            step: 0,
            rng,
        })
    }

    /// Steps already handed out
    pub fn step(&self) -> usize {
        self.step
    }

    /// Total steps in the plan
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Steps still to come
    pub fn remaining(&self) -> usize {
        self.num_steps - self.step
    }

    /// Stops the plan; every later `next()` returns `None`.
    pub fn finish(&mut self) {
        self.step = self.num_steps;
    }

    /// The pool batches are drawn from
    pub fn pool(&self) -> &ImagePool {
        &self.pool
    }
}

impl Iterator for BatchPlan {
    type Item = BatchRequest;

    fn next(&mut self) -> Option<Self::Item> {
        if self.step >= self.num_steps {
            return None;
        }

        let paths = rand::seq::index::sample(&mut self.rng, self.pool.len(), self.batch_size)
            .into_iter()
            .filter_map(|i| self.pool.get(i).map(PathBuf::from))
            .collect();

        let request = BatchRequest {
            step: self.step,
            paths,
        };
        self.step += 1;

        Some(request)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BatchPlan {}
