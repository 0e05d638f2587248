//! # Report Pipeline
//!
//! Split, encode, fit the four model families, evaluate them on both sides of
//! the split and assemble the [`Report`].
//!
//! Splitting and encoding failures abort the run. Once the design matrices
//! exist the families are independent: they run in parallel over the same
//! immutable matrices, and a family that fails is recorded as
//! [`FamilyOutcome::Failed`] while the others complete.
//!
//! The penalized families share one fold assignment, seeded by the run seed, so
//! their cross-validation errors are directly comparable.

use rayon::prelude::*;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::{ConfigError, PipelineConfig};
use crate::cv::Folds;
use crate::data::Dataset;
use crate::encode::{DesignMatrix, EncodeError, EncodingSchema};
use crate::evaluate::evaluate;
use crate::model::{FitError, FitResult, Hyperparameter, LinearModel, ModelFamily};
use crate::penalized::{CvPath, cross_validate, elastic_net_search};
use crate::report::{FamilyDetails, FamilyOutcome, FamilyReport, Report, SplitSummary};
use crate::split::{SplitError, split_dataset};
use crate::subset::{best_subset, refit_candidate};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration rejected: {0}")]
    Config(#[from] ConfigError),
    #[error("Train/test split failed: {0}")]
    Split(#[from] SplitError),
    #[error("Feature encoding failed: {0}")]
    Encode(#[from] EncodeError),
}

/// Runs every model family and collects the outcomes.
pub fn run_pipeline(dataset: &Dataset, config: &PipelineConfig) -> Result<Report, PipelineError> {
    config.validate()?;

    let split = split_dataset(dataset, config.split_fraction, config.seed)?;
    log::info!(
        "Split {} records into {} training and {} test rows (fraction {}, seed {})",
        dataset.len(),
        split.train_idx.len(),
        split.test_idx.len(),
        config.split_fraction,
        config.seed
    );

    let train_records = dataset.select(&split.train_idx);
    let test_records = dataset.select(&split.test_idx);
    let schema = EncodingSchema::fit(&train_records, &config.encoder)?;
    let train = schema.encode(&train_records)?;
    let test = schema.encode(&test_records)?;
    log::info!(
        "Encoded {} predictor columns: {}",
        schema.n_columns(),
        schema.columns.join(", ")
    );

    let families: BTreeMap<String, FamilyOutcome> = ModelFamily::ALL
        .par_iter()
        .map(|&family| {
            let outcome = match run_family(family, &train, &test, config) {
                Ok(report) => {
                    log::info!(
                        "{}: test RMSE {:.2}, test R² (log) {:.4}",
                        family.name(),
                        report.primary.test_metrics.rmse_charges,
                        report.primary.test_metrics.r_squared_log
                    );
                    FamilyOutcome::Fitted(report)
                }
                Err(e) => {
                    log::warn!("{} failed: {e}", family.name());
                    FamilyOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            (family.name().to_string(), outcome)
        })
        .collect();

    Ok(Report {
        config: config.clone(),
        schema,
        split: SplitSummary {
            n_total: dataset.len(),
            n_train: train.n_rows(),
            n_test: test.n_rows(),
            fraction: config.split_fraction,
            seed: config.seed,
            mean_log_charges_train: train.y.mean().unwrap_or(f64::NAN),
            mean_log_charges_test: test.y.mean().unwrap_or(f64::NAN),
        },
        families,
    })
}

fn run_family(
    family: ModelFamily,
    train: &DesignMatrix,
    test: &DesignMatrix,
    config: &PipelineConfig,
) -> Result<FamilyReport, FitError> {
    match family {
        ModelFamily::BestSubset => {
            let search = best_subset(train, &config.subset, config.seed)?;
            let primary = fit_result(
                family,
                "min_bic",
                Hyperparameter::SubsetSize {
                    size: search.best_bic_size,
                },
                &search.model,
                train,
                test,
            )?;
            let mut alternatives = Vec::new();
            if search.best_cv_size != search.best_bic_size {
                let model = refit_candidate(train, &search.candidates[search.best_cv_size - 1])?;
                alternatives.push(fit_result(
                    family,
                    "min_cv_rmse",
                    Hyperparameter::SubsetSize {
                        size: search.best_cv_size,
                    },
                    &model,
                    train,
                    test,
                )?);
            }
            Ok(FamilyReport {
                primary,
                alternatives,
                details: FamilyDetails::Subset {
                    candidates: search.candidates,
                    best_bic_size: search.best_bic_size,
                    best_cv_size: search.best_cv_size,
                },
            })
        }
        ModelFamily::Ridge | ModelFamily::Lasso => {
            let alpha = if family == ModelFamily::Ridge { 0.0 } else { 1.0 };
            let folds = Folds::new(train.n_rows(), config.penalized.folds, config.seed)?;
            let path = cross_validate(train, alpha, &config.penalized, &folds)?;
            path_report(family, vec![path], 0, train, test)
        }
        ModelFamily::ElasticNet => {
            let folds = Folds::new(train.n_rows(), config.penalized.folds, config.seed)?;
            let search =
                elastic_net_search(train, &config.elastic_net_alphas, &config.penalized, &folds)?;
            path_report(family, search.paths, search.best, train, test)
        }
    }
}

fn path_report(
    family: ModelFamily,
    paths: Vec<CvPath>,
    best: usize,
    train: &DesignMatrix,
    test: &DesignMatrix,
) -> Result<FamilyReport, FitError> {
    let selected = &paths[best];
    let penalty = |lambda| Hyperparameter::Penalty {
        lambda,
        alpha: selected.curve.alpha,
    };
    let primary = fit_result(
        family,
        "lambda_min",
        penalty(selected.curve.lambda_min),
        &selected.fit_min.model,
        train,
        test,
    )?;
    let alternatives = vec![fit_result(
        family,
        "lambda_1se",
        penalty(selected.curve.lambda_1se),
        &selected.fit_1se.model,
        train,
        test,
    )?];
    Ok(FamilyReport {
        primary,
        alternatives,
        details: FamilyDetails::Path {
            selected_alpha: selected.curve.alpha,
            curves: paths.iter().map(|p| p.curve.clone()).collect(),
        },
    })
}

fn fit_result(
    family: ModelFamily,
    label: &str,
    hyperparameter: Hyperparameter,
    model: &LinearModel,
    train: &DesignMatrix,
    test: &DesignMatrix,
) -> Result<FitResult, FitError> {
    Ok(FitResult {
        family,
        label: label.to_string(),
        hyperparameter,
        intercept: model.intercept,
        coefficients: model.named_coefficients(),
        train_metrics: evaluate(model, train)?,
        test_metrics: evaluate(model, test)?,
    })
}
