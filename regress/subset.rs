//! # Best-Subset Search (sequential replacement)
//!
//! Exhaustive enumeration of all `2^P` predictor subsets is not attempted.
//! Instead each subset size is searched with the sequential-replacement
//! heuristic:
//!
//! 1. Size `k` starts from the size `k - 1` winner plus the single predictor
//!    that lowers the in-sample residual sum of squares the most.
//! 2. Swaps of one selected predictor for one unselected predictor are then
//!    applied, best swap first, until no swap lowers the RSS.
//!
//! The result is one candidate per size. It is a local optimum and is not
//! guaranteed to be the globally best subset of that size.
//!
//! Every candidate is scored in-sample (RSS, R², adjusted R², Mallows' Cp,
//! BIC) and out-of-sample by repeated k-fold cross-validated RMSE on the log
//! scale. The recommended size minimises BIC; sizes whose BIC is within the
//! tie tolerance of the minimum resolve to the smallest of them.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cv::Folds;
use crate::encode::DesignMatrix;
use crate::evaluate::{adjusted_r_squared, rmse};
use crate::model::{FitError, LinearModel};
use crate::ols::{OlsFit, fit_ols};

/// Safety cap on swap passes per subset size.
const MAX_SWAP_PASSES: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsetConfig {
    pub max_size: usize,
    pub folds: usize,
    pub repeats: usize,
    /// Absolute BIC (and CV RMSE) difference treated as a tie.
    pub tie_tolerance: f64,
}

impl Default for SubsetConfig {
    fn default() -> Self {
        Self {
            max_size: 7,
            folds: 10,
            repeats: 3,
            tie_tolerance: 1e-8,
        }
    }
}

/// The chosen subset for one size and its scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetCandidate {
    pub size: usize,
    pub predictors: Vec<String>,
    #[serde(skip)]
    pub column_indices: Vec<usize>,
    pub rss: f64,
    pub r_squared: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adj_r_squared: Option<f64>,
    pub cp: f64,
    pub bic: f64,
    /// Mean RMSE over all held-out folds and repeats, log scale.
    pub cv_rmse: f64,
    /// Sample standard deviation of the per-fold RMSEs.
    pub cv_rmse_sd: f64,
}

#[derive(Debug, Clone)]
pub struct SubsetSearch {
    pub candidates: Vec<SubsetCandidate>,
    pub best_bic_size: usize,
    pub best_cv_size: usize,
    /// OLS refit of the recommended (minimum-BIC) subset on the full design.
    pub model: LinearModel,
}

pub fn best_subset(
    design: &DesignMatrix,
    config: &SubsetConfig,
    seed: u64,
) -> Result<SubsetSearch, FitError> {
    let n = design.n_rows();
    let p = design.n_predictors();
    if config.max_size == 0 || config.max_size > p {
        return Err(FitError::InvalidSubsetSize {
            requested: config.max_size,
            available: p,
        });
    }
    if n < p + 2 {
        return Err(FitError::InsufficientData {
            rows: n,
            required: p + 2,
        });
    }

    let fold_sets = Folds::repeated(n, config.folds, config.repeats, seed)?;
    let min_training = fold_sets
        .iter()
        .map(Folds::min_training_rows)
        .min()
        .unwrap_or(n);
    if min_training < config.max_size + 1 {
        return Err(FitError::InsufficientData {
            rows: min_training,
            required: config.max_size + 1,
        });
    }

    let full = fit_ols(design.x.view(), design.y.view())?;
    let sigma2 = full.rss / (n - p - 1) as f64;
    let y_mean = design.y.mean().unwrap_or(0.0);
    let tss: f64 = design.y.iter().map(|v| (v - y_mean).powi(2)).sum();

    log::info!(
        "Sequential-replacement subset search over {p} predictors, sizes 1..={}, {} x {}-fold CV",
        config.max_size,
        config.repeats,
        config.folds
    );

    let selections = sequential_replacement(design, config.max_size, tss)?;

    let candidates: Vec<SubsetCandidate> = selections
        .into_par_iter()
        .map(|(columns, rss)| -> Result<SubsetCandidate, FitError> {
            let size = columns.len();
            let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };
            let (cv_rmse, cv_rmse_sd) = cross_validated_rmse(design, &columns, &fold_sets)?;
            Ok(SubsetCandidate {
                size,
                predictors: columns.iter().map(|&j| design.columns[j].clone()).collect(),
                rss,
                r_squared,
                adj_r_squared: adjusted_r_squared(r_squared, n, size),
                cp: rss / sigma2 - n as f64 + 2.0 * (size + 1) as f64,
                bic: n as f64 * (rss / n as f64).ln() + (size + 1) as f64 * (n as f64).ln(),
                cv_rmse,
                cv_rmse_sd,
                column_indices: columns,
            })
        })
        .collect::<Result<_, _>>()?;

    for c in &candidates {
        log::debug!(
            "size {}: [{}] BIC {:.3} Cp {:.3} CV RMSE {:.4}",
            c.size,
            c.predictors.join(", "),
            c.bic,
            c.cp,
            c.cv_rmse
        );
    }

    let best_bic_size = smallest_within(&candidates, |c| c.bic, config.tie_tolerance);
    let best_cv_size = smallest_within(&candidates, |c| c.cv_rmse, config.tie_tolerance);
    log::info!("Minimum-BIC subset size {best_bic_size}; minimum CV RMSE size {best_cv_size}");

    let model = refit_candidate(design, &candidates[best_bic_size - 1])?;

    Ok(SubsetSearch {
        candidates,
        best_bic_size,
        best_cv_size,
        model,
    })
}

/// OLS fit of one candidate's predictors on `design`, spanning every column.
pub fn refit_candidate(
    design: &DesignMatrix,
    candidate: &SubsetCandidate,
) -> Result<LinearModel, FitError> {
    let fit = fit_ols(
        design.x.select(Axis(1), &candidate.column_indices).view(),
        design.y.view(),
    )?;
    Ok(expand_to_full(&fit, &candidate.column_indices, &design.columns))
}

/// Smallest size whose score is within `tolerance` of the minimum score.
fn smallest_within(
    candidates: &[SubsetCandidate],
    score: impl Fn(&SubsetCandidate) -> f64,
    tolerance: f64,
) -> usize {
    let best = candidates
        .iter()
        .map(&score)
        .fold(f64::INFINITY, f64::min);
    candidates
        .iter()
        .find(|c| score(*c) <= best + tolerance)
        .map_or(1, |c| c.size)
}

/// Places subset coefficients into a vector spanning every design column.
fn expand_to_full(fit: &OlsFit, columns: &[usize], names: &[String]) -> LinearModel {
    let mut coefficients = Array1::zeros(names.len());
    for (&j, &beta) in columns.iter().zip(fit.coefficients.iter()) {
        coefficients[j] = beta;
    }
    LinearModel {
        columns: names.to_vec(),
        intercept: fit.intercept,
        coefficients,
    }
}

/// In-sample RSS of the OLS fit on `columns`. Rank-deficient subsets score
/// `+inf` so the search simply never picks them.
fn subset_rss(design: &DesignMatrix, columns: &[usize]) -> Result<f64, FitError> {
    match fit_ols(design.x.select(Axis(1), columns).view(), design.y.view()) {
        Ok(fit) => Ok(fit.rss),
        Err(FitError::SingularDesignMatrix(_)) => Ok(f64::INFINITY),
        Err(e) => Err(e),
    }
}

/// One `(sorted column indices, rss)` selection per size `1..=max_size`.
fn sequential_replacement(
    design: &DesignMatrix,
    max_size: usize,
    tss: f64,
) -> Result<Vec<(Vec<usize>, f64)>, FitError> {
    let p = design.n_predictors();
    let improvement_floor = 1e-12 * tss.max(1.0);
    let mut selected: Vec<usize> = Vec::with_capacity(max_size);
    let mut results = Vec::with_capacity(max_size);

    for size in 1..=max_size {
        // Forward step.
        let mut best: Option<(usize, f64)> = None;
        for j in (0..p).filter(|j| !selected.contains(j)) {
            let mut trial = selected.clone();
            trial.push(j);
            let rss = subset_rss(design, &trial)?;
            if best.is_none_or(|(_, b)| rss < b) {
                best = Some((j, rss));
            }
        }
        let Some((added, mut current)) = best else {
            break;
        };
        selected.push(added);

        // Replacement passes.
        for _ in 0..MAX_SWAP_PASSES {
            let mut best_swap: Option<(usize, usize, f64)> = None;
            for slot in 0..selected.len() {
                for j in (0..p).filter(|j| !selected.contains(j)) {
                    let mut trial = selected.clone();
                    trial[slot] = j;
                    let rss = subset_rss(design, &trial)?;
                    let bar = best_swap.map_or(current - improvement_floor, |(_, _, b)| b);
                    if rss < bar {
                        best_swap = Some((slot, j, rss));
                    }
                }
            }
            match best_swap {
                Some((slot, j, rss)) => {
                    log::trace!(
                        "size {size}: swapping column {} for {j} (RSS {current:.6} -> {rss:.6})",
                        selected[slot]
                    );
                    selected[slot] = j;
                    current = rss;
                }
                None => break,
            }
        }

        let mut sorted = selected.clone();
        sorted.sort_unstable();
        results.push((sorted, current));
    }
    Ok(results)
}

/// Mean and standard deviation of held-out RMSE over every fold of every repeat.
fn cross_validated_rmse(
    design: &DesignMatrix,
    columns: &[usize],
    fold_sets: &[Folds],
) -> Result<(f64, f64), FitError> {
    let x = design.x.select(Axis(1), columns);
    let mut fold_rmse = Vec::new();
    for folds in fold_sets {
        for fold in 0..folds.k() {
            let (train, held_out) = folds.split(fold);
            let fit = fit_varying_columns(
                x.select(Axis(0), &train).view(),
                design.y.select(Axis(0), &train).view(),
            )?;
            let predicted = fit.predict(x.select(Axis(0), &held_out).view());
            let observed = design.y.select(Axis(0), &held_out);
            fold_rmse.push(rmse(observed.view(), predicted.view()));
        }
    }
    let values = Array1::from_vec(fold_rmse);
    let mean = values.mean().unwrap_or(f64::NAN);
    let sd = if values.len() > 1 { values.std(1.0) } else { 0.0 };
    Ok((mean, sd))
}

/// OLS restricted to the columns that vary in `x`. A dummy whose only rows
/// were held out is constant in the training fold; it keeps a zero coefficient
/// instead of making the fold singular.
fn fit_varying_columns(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<OlsFit, FitError> {
    let varying: Vec<usize> = (0..x.ncols())
        .filter(|&j| {
            let column = x.column(j);
            column.iter().any(|&v| v != column[0])
        })
        .collect();
    if varying.len() == x.ncols() {
        return fit_ols(x, y);
    }
    let fit = fit_ols(x.select(Axis(1), &varying).view(), y)?;
    let mut coefficients = Array1::zeros(x.ncols());
    for (&j, &beta) in varying.iter().zip(fit.coefficients.iter()) {
        coefficients[j] = beta;
    }
    Ok(OlsFit {
        intercept: fit.intercept,
        coefficients,
        rss: fit.rss,
    })
}
