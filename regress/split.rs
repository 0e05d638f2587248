//! Seeded, response-stratified train/test partitioning.
//!
//! Rows are ordered by the response and cut into quantile strata. The global
//! training count is `round(fraction * n)`; it is apportioned over the strata by
//! the largest-remainder rule, so the realised fraction never drifts more than
//! half a row from the request. Within a stratum the rows are shuffled with a
//! `StdRng` seeded once per call, which makes the partition a pure function of
//! `(response, fraction, seed, strata)`.

use crate::data::Dataset;
use ndarray::ArrayView1;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of response quantile groups used when stratifying.
pub const DEFAULT_STRATA: usize = 5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplitError {
    #[error("Split fraction must lie strictly between 0 and 1, but was {0}.")]
    InvalidFraction(f64),
    #[error("Cannot split an empty dataset.")]
    EmptyDataset,
}

/// Disjoint, exhaustive row partition. Both index lists are sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train_idx: Vec<usize>,
    pub test_idx: Vec<usize>,
}

impl Split {
    pub fn len(&self) -> usize {
        self.train_idx.len() + self.test_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits a dataset on its `charges` column.
pub fn split_dataset(dataset: &Dataset, fraction: f64, seed: u64) -> Result<Split, SplitError> {
    let charges = dataset.charges();
    stratified_split(charges.view(), fraction, seed, DEFAULT_STRATA)
}

pub fn stratified_split(
    response: ArrayView1<f64>,
    fraction: f64,
    seed: u64,
    strata: usize,
) -> Result<Split, SplitError> {
    let n = response.len();
    if n == 0 {
        return Err(SplitError::EmptyDataset);
    }
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(SplitError::InvalidFraction(fraction));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| response[a].total_cmp(&response[b]).then(a.cmp(&b)));

    let groups = strata.clamp(1, n);
    let bounds: Vec<(usize, usize)> = (0..groups)
        .map(|g| (g * n / groups, (g + 1) * n / groups))
        .collect();

    let target = ((fraction * n as f64).round() as usize).min(n);
    let quotas = apportion(&bounds, fraction, target);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train_idx = Vec::with_capacity(target);
    let mut test_idx = Vec::with_capacity(n - target);
    for (&(start, end), &quota) in bounds.iter().zip(&quotas) {
        let mut members = order[start..end].to_vec();
        members.shuffle(&mut rng);
        train_idx.extend_from_slice(&members[..quota]);
        test_idx.extend_from_slice(&members[quota..]);
    }
    train_idx.sort_unstable();
    test_idx.sort_unstable();

    log::debug!(
        "Stratified split over {groups} strata: {} train / {} test (requested fraction {fraction})",
        train_idx.len(),
        test_idx.len()
    );
    Ok(Split {
        train_idx,
        test_idx,
    })
}

/// Largest-remainder allocation of `target` training rows over the strata.
fn apportion(bounds: &[(usize, usize)], fraction: f64, target: usize) -> Vec<usize> {
    let exact: Vec<f64> = bounds
        .iter()
        .map(|&(start, end)| fraction * (end - start) as f64)
        .collect();
    let mut quotas: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();

    let assigned: usize = quotas.iter().sum();
    let mut remaining = target.saturating_sub(assigned);

    let mut by_remainder: Vec<usize> = (0..bounds.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    for g in by_remainder {
        if remaining == 0 {
            break;
        }
        let size = bounds[g].1 - bounds[g].0;
        if quotas[g] < size {
            quotas[g] += 1;
            remaining -= 1;
        }
    }
    quotas
}
