//! Deterministic k-fold assignment.
//!
//! Rows are shuffled with a seeded `StdRng` and dealt round-robin into `k`
//! folds, so fold sizes differ by at most one. Folds are plain values: model
//! families that share a `Folds` see exactly the same partitions, which keeps
//! their cross-validation errors paired.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::model::FitError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folds {
    assignment: Vec<usize>,
    k: usize,
}

impl Folds {
    pub fn new(n: usize, k: usize, seed: u64) -> Result<Self, FitError> {
        if k < 2 || n < k {
            return Err(FitError::InsufficientData {
                rows: n,
                required: k.max(2),
            });
        }
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut assignment = vec![0; n];
        for (position, &row) in order.iter().enumerate() {
            assignment[row] = position % k;
        }
        Ok(Self { assignment, k })
    }

    /// `repeats` independent fold sets; repetition `r` is seeded with `seed + r`.
    pub fn repeated(n: usize, k: usize, repeats: usize, seed: u64) -> Result<Vec<Self>, FitError> {
        (0..repeats as u64)
            .map(|r| Self::new(n, k, seed.wrapping_add(r)))
            .collect()
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n_rows(&self) -> usize {
        self.assignment.len()
    }

    /// `(training rows, held-out rows)` for one fold, both ascending.
    pub fn split(&self, fold: usize) -> (Vec<usize>, Vec<usize>) {
        (0..self.assignment.len()).partition(|&row| self.assignment[row] != fold)
    }

    /// Size of the smallest training partition over all folds.
    pub fn min_training_rows(&self) -> usize {
        let largest_fold = (0..self.k)
            .map(|fold| self.assignment.iter().filter(|&&f| f == fold).count())
            .max()
            .unwrap_or(0);
        self.assignment.len() - largest_fold
    }
}
