use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evaluate::Metrics;

/// A comprehensive error type for model fitting failures. These abort the
/// affected model family only; the pipeline keeps going with the others.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error(
        "Not enough rows to fit: a cross-validation training fold has {rows} rows but at least {required} are needed."
    )]
    InsufficientData { rows: usize, required: usize },

    #[error("The design matrix is singular and the unpenalized fit has no unique solution: {0}")]
    SingularDesignMatrix(String),

    #[error("Subset size {requested} is invalid for a design with {available} predictors.")]
    InvalidSubsetSize { requested: usize, available: usize },

    #[error("The elastic-net mixing parameter must lie in [0, 1], but was {0}.")]
    InvalidAlpha(f64),

    #[error("Invalid penalty grid: {0}")]
    InvalidLambdaGrid(String),

    #[error("Dimension mismatch: expected {expected} but found {found}.")]
    DimensionMismatch { expected: usize, found: usize },
}

/// The four model families compared in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    BestSubset,
    Ridge,
    Lasso,
    ElasticNet,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 4] = [
        ModelFamily::BestSubset,
        ModelFamily::Ridge,
        ModelFamily::Lasso,
        ModelFamily::ElasticNet,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelFamily::BestSubset => "best_subset",
            ModelFamily::Ridge => "ridge",
            ModelFamily::Lasso => "lasso",
            ModelFamily::ElasticNet => "elastic_net",
        }
    }
}

/// A fitted linear predictor on the log-charges scale.
///
/// The coefficient vector always spans every design column; predictors a
/// model leaves out (unselected subset members, lasso zeros) carry `0.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub columns: Vec<String>,
    pub intercept: f64,
    pub coefficients: Array1<f64>,
}

impl LinearModel {
    /// Predicted `ln(charges)` for each row of `x`.
    pub fn predict_log(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, FitError> {
        if x.ncols() != self.coefficients.len() {
            return Err(FitError::DimensionMismatch {
                expected: self.coefficients.len(),
                found: x.ncols(),
            });
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }

    /// Number of predictors with a non-zero weight.
    pub fn nonzero_count(&self) -> usize {
        self.coefficients.iter().filter(|&&b| b != 0.0).count()
    }

    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|j| self.coefficients[j])
    }

    pub fn named_coefficients(&self) -> Vec<Coefficient> {
        self.columns
            .iter()
            .zip(self.coefficients.iter())
            .map(|(term, &estimate)| Coefficient {
                term: term.clone(),
                estimate,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
}

/// The tuning value a family settled on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Hyperparameter {
    SubsetSize { size: usize },
    Penalty { lambda: f64, alpha: f64 },
}

/// One evaluated model: coefficients plus metrics on both sides of the split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub family: ModelFamily,
    /// Short description of which candidate this is, e.g. `lambda_min`.
    pub label: String,
    pub hyperparameter: Hyperparameter,
    pub intercept: f64,
    pub coefficients: Vec<Coefficient>,
    pub train_metrics: Metrics,
    pub test_metrics: Metrics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_predict_log_adds_intercept() {
        let model = LinearModel {
            columns: vec!["age".into(), "bmi".into()],
            intercept: 7.0,
            coefficients: array![0.5, 0.0],
        };
        let x = array![[1.0, 10.0], [2.0, 20.0]];
        assert_eq!(model.predict_log(x.view()).unwrap(), array![7.5, 8.0]);
        assert_eq!(model.nonzero_count(), 1);
        assert_eq!(model.coefficient("bmi"), Some(0.0));
        assert_eq!(model.coefficient("kids"), None);
    }

    #[test]
    fn test_predict_log_rejects_wrong_width() {
        let model = LinearModel {
            columns: vec!["age".into()],
            intercept: 0.0,
            coefficients: array![1.0],
        };
        let x = array![[1.0, 2.0]];
        assert_eq!(
            model.predict_log(x.view()),
            Err(FitError::DimensionMismatch {
                expected: 1,
                found: 2
            })
        );
    }
}
