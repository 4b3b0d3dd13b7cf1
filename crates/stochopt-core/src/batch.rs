//! Deterministic mini-batch selection.
//!
//! Solvers draw observation indices through a [`BatchSelector`], which owns
//! the sampling cursor so interrupted runs can resume exactly where they
//! stopped. Two orders are supported:
//!
//! - **Sequential** (the default): blocks of `batch_size` consecutive
//!   indices advancing by `batch_size` and wrapping at `n`. Fully
//!   deterministic with no configuration.
//! - **Shuffled**: a permutation drawn from a seeded [`SmallRng`],
//!   reshuffled after every full pass. Deterministic given the seed.

use crate::error::SolverError;
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

/// Ordering policy for mini-batch index selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatchOrder {
    /// Consecutive blocks wrapping at `n`.
    Sequential,
    /// Seeded permutation, reshuffled every epoch.
    Shuffled {
        /// Seed for the permutation engine
        seed: u64,
    },
}

/// Stateful mini-batch index source.
///
/// The selector is owned by one solver run; its cursor (and permutation
/// state, for the shuffled order) is part of the solver state that makes
/// resumed runs reproduce uninterrupted ones.
#[derive(Debug, Clone)]
pub struct BatchSelector {
    num_observations: usize,
    batch_size: usize,
    order: BatchOrder,
    permutation: Vec<usize>,
    rng: Option<SmallRng>,
    cursor: usize,
}

impl BatchSelector {
    /// Creates a selector over `n` observations drawing `batch_size`
    /// indices per call.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when `batch_size` is zero or exceeds `n`.
    pub fn new(
        num_observations: usize,
        batch_size: usize,
        order: BatchOrder,
    ) -> Result<Self, SolverError> {
        if batch_size == 0 {
            return Err(SolverError::invalid_configuration(
                "must be positive",
                "batch_size",
                "0",
            ));
        }
        if batch_size > num_observations {
            return Err(SolverError::invalid_configuration(
                format!("must not exceed the {num_observations} observations"),
                "batch_size",
                batch_size.to_string(),
            ));
        }

        let permutation: Vec<usize> = (0..num_observations).collect();
        let rng = match order {
            BatchOrder::Sequential => None,
            BatchOrder::Shuffled { seed } => Some(SmallRng::seed_from_u64(seed)),
        };
        let mut selector = Self {
            num_observations,
            batch_size,
            order,
            permutation,
            rng,
            cursor: 0,
        };
        if let Some(rng) = &mut selector.rng {
            selector.permutation.shuffle(rng);
        }
        Ok(selector)
    }

    /// Creates a full-batch selector (every call yields `0..n`).
    pub fn full(num_observations: usize) -> Result<Self, SolverError> {
        Self::new(num_observations, num_observations, BatchOrder::Sequential)
    }

    /// The configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The number of observations the selector draws from.
    pub fn num_observations(&self) -> usize {
        self.num_observations
    }

    /// The configured ordering policy.
    pub fn order(&self) -> BatchOrder {
        self.order
    }

    /// True when every batch covers the full dataset.
    pub fn is_full_batch(&self) -> bool {
        self.batch_size == self.num_observations
    }

    /// Returns the next batch of observation indices.
    pub fn next_batch(&mut self) -> Vec<usize> {
        if self.is_full_batch() {
            return self.permutation.clone();
        }
        if self.cursor >= self.num_observations {
            self.cursor = 0;
            if let Some(rng) = &mut self.rng {
                self.permutation.shuffle(rng);
            }
        }
        let mut batch = Vec::with_capacity(self.batch_size);
        for t in 0..self.batch_size {
            batch.push(self.permutation[(self.cursor + t) % self.num_observations]);
        }
        self.cursor += self.batch_size;
        batch
    }

    /// Restores the selector to its initial state (cursor at zero, fresh
    /// permutation from the original seed).
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.permutation = (0..self.num_observations).collect();
        self.rng = match self.order {
            BatchOrder::Sequential => None,
            BatchOrder::Shuffled { seed } => Some(SmallRng::seed_from_u64(seed)),
        };
        if let Some(rng) = &mut self.rng {
            self.permutation.shuffle(rng);
        }
    }
}
