// regress/penalized.rs

//! # Penalized Regression Paths (ridge, lasso, elastic net)
//!
//! Minimises, for a fixed mixing parameter `alpha` and penalty `lambda`,
//!
//! ```text
//! (1 / 2n) * sum (y - b0 - X b)^2 + lambda * [ alpha * |b|_1 + (1 - alpha) / 2 * |b|_2^2 ]
//! ```
//!
//! with an unpenalized intercept, by cyclic coordinate descent with soft
//! thresholding. Predictors are centered and (by default) scaled to unit
//! population variance before fitting, so the penalty acts on standardized
//! coefficients; results are always mapped back to the original predictor scale.
//! Columns with no variance are held at zero.
//!
//! A decreasing `lambda` grid is solved with warm starts. Cross-validation reuses
//! one grid (computed on the full design) across folds, then reports the curve,
//! `lambda_min` (lowest mean error, ties to the larger penalty) and `lambda_1se`
//! (largest penalty within one standard error of that minimum).
//!
//! Numerical notes:
//! - Any `lambda * (1 - alpha) > 0` makes the problem strictly convex, so ridge
//!   and elastic-net fits stay unique under collinearity.
//! - With `alpha = 1` and perfectly collinear columns the lasso optimum is not
//!   unique. Coordinate descent returns one of the optimal solutions; which one
//!   depends on column order. This is left as is.
//! - `lambda = 0` is plain least squares and is rejected with
//!   `SingularDesignMatrix` when the active columns are rank deficient.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cv::Folds;
use crate::encode::DesignMatrix;
use crate::model::{FitError, LinearModel};
use crate::ols::{center_columns, fit_ols};

/// Lower bound on `alpha` when deriving `lambda_max`, so ridge grids stay finite.
const ALPHA_FLOOR_FOR_GRID: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LambdaGrid {
    /// `count` log-spaced values from the smallest penalty that zeroes every
    /// coefficient down to `min_ratio` times that value.
    Auto { count: usize, min_ratio: f64 },
    Explicit { values: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub folds: usize,
    pub grid: LambdaGrid,
    pub standardize: bool,
    /// Coordinate descent stops once no coefficient moves the fitted values by
    /// more than this (root mean square, standardized units) in a full pass.
    pub tolerance: f64,
    pub max_passes: usize,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            folds: 10,
            grid: LambdaGrid::Auto {
                count: 100,
                min_ratio: 1e-4,
            },
            standardize: true,
            tolerance: 1e-7,
            max_passes: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PenalizedFit {
    pub lambda: f64,
    pub alpha: f64,
    pub model: LinearModel,
    pub passes: usize,
    pub converged: bool,
}

/// Cross-validation curve over the lambda grid, ready for plotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvCurve {
    pub alpha: f64,
    /// Decreasing.
    pub lambdas: Vec<f64>,
    /// Mean held-out MSE on the log scale.
    pub cv_mean: Vec<f64>,
    /// Standard error of `cv_mean` across folds.
    pub cv_se: Vec<f64>,
    /// Non-zero coefficients of the full-data fit at each lambda.
    pub nonzero: Vec<usize>,
    pub lambda_min: f64,
    pub lambda_1se: f64,
    pub index_min: usize,
    pub index_1se: usize,
}

#[derive(Debug, Clone)]
pub struct CvPath {
    pub curve: CvCurve,
    pub fit_min: PenalizedFit,
    pub fit_1se: PenalizedFit,
}

#[derive(Debug, Clone)]
pub struct ElasticNetSearch {
    /// One path per alpha, in the order given.
    pub paths: Vec<CvPath>,
    /// Index into `paths` of the alpha with the lowest CV minimum.
    pub best: usize,
}

impl ElasticNetSearch {
    pub fn best_path(&self) -> &CvPath {
        &self.paths[self.best]
    }
}

fn validate_alpha(alpha: f64) -> Result<(), FitError> {
    if (0.0..=1.0).contains(&alpha) {
        Ok(())
    } else {
        Err(FitError::InvalidAlpha(alpha))
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

/// Centered (and optionally scaled) copy of a design, with the bookkeeping
/// needed to map coefficients back.
struct Standardized {
    x: Array2<f64>,
    y: Array1<f64>,
    means: Array1<f64>,
    scales: Array1<f64>,
    /// Mean of squares of each transformed column; 0 marks an inactive column.
    sq_norms: Array1<f64>,
    y_mean: f64,
}

impl Standardized {
    fn new(x: ArrayView2<f64>, y: ArrayView1<f64>, scale: bool) -> Self {
        let n = y.len().max(1) as f64;
        let (means, mut xc) = center_columns(x);
        let mut scales = Array1::ones(x.ncols());
        let mut sq_norms = Array1::zeros(x.ncols());
        for (j, mut column) in xc.axis_iter_mut(Axis(1)).enumerate() {
            let mean_square = column.dot(&column) / n;
            if mean_square <= f64::EPSILON * f64::EPSILON {
                column.fill(0.0);
                continue;
            }
            if scale {
                let sd = mean_square.sqrt();
                column.mapv_inplace(|v| v / sd);
                scales[j] = sd;
                sq_norms[j] = 1.0;
            } else {
                sq_norms[j] = mean_square;
            }
        }
        let y_mean = y.sum() / n;
        Self {
            x: xc,
            y: &y - y_mean,
            means,
            scales,
            sq_norms,
            y_mean,
        }
    }

    fn active_columns(&self) -> Vec<usize> {
        (0..self.sq_norms.len())
            .filter(|&j| self.sq_norms[j] > 0.0)
            .collect()
    }

    fn to_model(&self, beta: &Array1<f64>, columns: &[String]) -> LinearModel {
        let coefficients = beta / &self.scales;
        let intercept = self.y_mean - self.means.dot(&coefficients);
        LinearModel {
            columns: columns.to_vec(),
            intercept,
            coefficients,
        }
    }

    /// Smallest penalty at which every coefficient is zero.
    fn lambda_max(&self, alpha: f64) -> f64 {
        let n = self.y.len().max(1) as f64;
        let max_inner = self
            .x
            .t()
            .dot(&self.y)
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        max_inner / (n * alpha.max(ALPHA_FLOOR_FOR_GRID))
    }

    /// Runs coordinate descent from `beta`, keeping `residual = y - X beta`.
    fn descend(
        &self,
        lambda: f64,
        alpha: f64,
        beta: &mut Array1<f64>,
        residual: &mut Array1<f64>,
        config: &PathConfig,
    ) -> (usize, bool) {
        let n = self.y.len() as f64;
        let l1 = lambda * alpha;
        let l2 = lambda * (1.0 - alpha);
        let active = self.active_columns();

        for pass in 1..=config.max_passes {
            let mut largest_move = 0.0_f64;
            for &j in &active {
                let column = self.x.column(j);
                let v = self.sq_norms[j];
                let rho = column.dot(&*residual) / n + v * beta[j];
                let updated = soft_threshold(rho, l1) / (v + l2);
                let delta = updated - beta[j];
                if delta != 0.0 {
                    residual.scaled_add(-delta, &column);
                    beta[j] = updated;
                    largest_move = largest_move.max(v.sqrt() * delta.abs());
                }
            }
            if largest_move < config.tolerance {
                return (pass, true);
            }
        }
        (config.max_passes, false)
    }

    /// Least squares with no penalty needs the active columns to be full rank.
    fn check_identifiable(&self) -> Result<(), FitError> {
        let active = self.active_columns();
        fit_ols(self.x.select(Axis(1), &active).view(), self.y.view()).map(|_| ())
    }
}

/// Resolves a grid specification against a design into decreasing lambdas.
pub fn lambda_grid(design: &DesignMatrix, alpha: f64, config: &PathConfig) -> Result<Vec<f64>, FitError> {
    validate_alpha(alpha)?;
    match &config.grid {
        LambdaGrid::Explicit { values } => {
            if values.is_empty() {
                return Err(FitError::InvalidLambdaGrid("the grid is empty".to_string()));
            }
            if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
                return Err(FitError::InvalidLambdaGrid(format!(
                    "penalties must be finite and non-negative, found {bad}"
                )));
            }
            let mut sorted = values.clone();
            sorted.sort_by(|a, b| b.total_cmp(a));
            sorted.dedup();
            Ok(sorted)
        }
        LambdaGrid::Auto { count, min_ratio } => {
            if *count == 0 || !(*min_ratio > 0.0 && *min_ratio < 1.0) {
                return Err(FitError::InvalidLambdaGrid(format!(
                    "automatic grid needs count >= 1 and 0 < min_ratio < 1 (count {count}, min_ratio {min_ratio})"
                )));
            }
            let standardized =
                Standardized::new(design.x.view(), design.y.view(), config.standardize);
            let lambda_max = standardized.lambda_max(alpha);
            if !(lambda_max.is_finite() && lambda_max > 0.0) {
                return Err(FitError::InvalidLambdaGrid(
                    "the response is uncorrelated with every predictor, so no penalty scale exists"
                        .to_string(),
                ));
            }
            if *count == 1 {
                return Ok(vec![lambda_max]);
            }
            let step = min_ratio.ln() / (*count - 1) as f64;
            Ok((0..*count)
                .map(|i| lambda_max * (step * i as f64).exp())
                .collect())
        }
    }
}

/// Fits every lambda in `lambdas` (which must be decreasing) with warm starts.
pub fn fit_path(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    columns: &[String],
    lambdas: &[f64],
    alpha: f64,
    config: &PathConfig,
) -> Result<Vec<PenalizedFit>, FitError> {
    validate_alpha(alpha)?;
    if x.nrows() != y.len() {
        return Err(FitError::DimensionMismatch {
            expected: x.nrows(),
            found: y.len(),
        });
    }
    if y.len() < 2 {
        return Err(FitError::InsufficientData {
            rows: y.len(),
            required: 2,
        });
    }

    let standardized = Standardized::new(x, y, config.standardize);
    if lambdas.contains(&0.0) {
        standardized.check_identifiable()?;
    }

    let mut beta = Array1::zeros(x.ncols());
    let mut residual = standardized.y.clone();
    let mut fits = Vec::with_capacity(lambdas.len());
    for &lambda in lambdas {
        let (passes, converged) =
            standardized.descend(lambda, alpha, &mut beta, &mut residual, config);
        if !converged {
            log::warn!(
                "Coordinate descent did not converge within {passes} passes (lambda {lambda:.4e}, alpha {alpha})"
            );
        }
        fits.push(PenalizedFit {
            lambda,
            alpha,
            model: standardized.to_model(&beta, columns),
            passes,
            converged,
        });
    }
    Ok(fits)
}

/// Fits a single penalty from a cold start.
pub fn fit_penalized(
    design: &DesignMatrix,
    lambda: f64,
    alpha: f64,
    config: &PathConfig,
) -> Result<PenalizedFit, FitError> {
    if !(lambda.is_finite() && lambda >= 0.0) {
        return Err(FitError::InvalidLambdaGrid(format!(
            "penalty must be finite and non-negative, found {lambda}"
        )));
    }
    let mut fits = fit_path(
        design.x.view(),
        design.y.view(),
        &design.columns,
        &[lambda],
        alpha,
        config,
    )?;
    Ok(fits.remove(0))
}

fn held_out_mse(fit: &PenalizedFit, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<f64, FitError> {
    let predicted = fit.model.predict_log(x)?;
    let residual = &y - &predicted;
    Ok(residual.dot(&residual) / y.len().max(1) as f64)
}

/// k-fold cross-validation of one alpha over its lambda grid.
pub fn cross_validate(
    design: &DesignMatrix,
    alpha: f64,
    config: &PathConfig,
    folds: &Folds,
) -> Result<CvPath, FitError> {
    if folds.n_rows() != design.n_rows() {
        return Err(FitError::DimensionMismatch {
            expected: design.n_rows(),
            found: folds.n_rows(),
        });
    }
    let lambdas = lambda_grid(design, alpha, config)?;
    log::info!(
        "Cross-validating alpha = {alpha} over {} penalties ({:.4e} .. {:.4e}), {} folds",
        lambdas.len(),
        lambdas[0],
        lambdas[lambdas.len() - 1],
        folds.k()
    );

    let fold_mse: Vec<Vec<f64>> = (0..folds.k())
        .into_par_iter()
        .map(|fold| -> Result<Vec<f64>, FitError> {
            let (train, held_out) = folds.split(fold);
            let fitting = design.select_rows(&train);
            let testing = design.select_rows(&held_out);
            fit_path(
                fitting.x.view(),
                fitting.y.view(),
                &design.columns,
                &lambdas,
                alpha,
                config,
            )?
            .iter()
            .map(|fit| held_out_mse(fit, testing.x.view(), testing.y.view()))
            .collect()
        })
        .collect::<Result<_, _>>()?;

    let k = fold_mse.len() as f64;
    let mut cv_mean = Vec::with_capacity(lambdas.len());
    let mut cv_se = Vec::with_capacity(lambdas.len());
    for l in 0..lambdas.len() {
        let errors: Array1<f64> = fold_mse.iter().map(|row| row[l]).collect();
        cv_mean.push(errors.sum() / k);
        cv_se.push(if k > 1.0 { errors.std(1.0) / k.sqrt() } else { 0.0 });
    }

    let index_min = first_minimum(&cv_mean);
    let index_1se = one_se_index(&cv_mean, &cv_se, index_min);

    let full_path = fit_path(
        design.x.view(),
        design.y.view(),
        &design.columns,
        &lambdas,
        alpha,
        config,
    )?;
    let nonzero = full_path.iter().map(|f| f.model.nonzero_count()).collect();

    log::info!(
        "alpha = {alpha}: lambda_min = {:.4e} (CV MSE {:.5}), lambda_1se = {:.4e}",
        lambdas[index_min],
        cv_mean[index_min],
        lambdas[index_1se]
    );

    Ok(CvPath {
        fit_min: full_path[index_min].clone(),
        fit_1se: full_path[index_1se].clone(),
        curve: CvCurve {
            alpha,
            lambda_min: lambdas[index_min],
            lambda_1se: lambdas[index_1se],
            lambdas,
            cv_mean,
            cv_se,
            nonzero,
            index_min,
            index_1se,
        },
    })
}

/// Cross-validates every alpha on the same folds and keeps the best one.
pub fn elastic_net_search(
    design: &DesignMatrix,
    alphas: &[f64],
    config: &PathConfig,
    folds: &Folds,
) -> Result<ElasticNetSearch, FitError> {
    if alphas.is_empty() {
        return Err(FitError::InvalidAlpha(f64::NAN));
    }
    for &alpha in alphas {
        validate_alpha(alpha)?;
    }

    let paths: Vec<CvPath> = alphas
        .par_iter()
        .map(|&alpha| cross_validate(design, alpha, config, folds))
        .collect::<Result<_, _>>()?;

    let score = |path: &CvPath| path.curve.cv_mean[path.curve.index_min];
    let best = first_minimum(&paths.iter().map(score).collect::<Vec<_>>());
    log::info!(
        "Elastic net: alpha = {} selected (CV MSE {:.5})",
        paths[best].curve.alpha,
        score(&paths[best])
    );
    Ok(ElasticNetSearch { paths, best })
}

/// Index of the smallest value. Exact ties resolve to the earliest index,
/// which on a descending grid is the larger penalty.
fn first_minimum(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &value) in values.iter().enumerate() {
        if value < values[best] {
            best = i;
        }
    }
    best
}

/// Earliest (most penalized) grid point whose CV error is within one
/// standard error of the minimum.
fn one_se_index(cv_mean: &[f64], cv_se: &[f64], index_min: usize) -> usize {
    let threshold = cv_mean[index_min] + cv_se[index_min];
    cv_mean
        .iter()
        .position(|&mean| mean <= threshold)
        .unwrap_or(index_min)
}
