//! Ordinary least squares with an unpenalized intercept.
//!
//! Predictors and response are centered first, which removes the intercept
//! from the normal equations; the remaining Gram system `XcᵀXc b = Xcᵀyc` is
//! solved with a Cholesky factorization. A factorization failure, a column with
//! no variance, or a pivot that collapses relative to the largest diagonal entry
//! means the design is rank deficient.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::{FactorizeC, SolveC, UPLO};

use crate::model::FitError;

/// Relative size below which a squared Cholesky pivot counts as zero.
const PIVOT_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct OlsFit {
    pub intercept: f64,
    pub coefficients: Array1<f64>,
    /// Residual sum of squares on the fitting data.
    pub rss: f64,
}

impl OlsFit {
    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }
}

/// Column means and the centered copy of `x`.
pub(crate) fn center_columns(x: ArrayView2<f64>) -> (Array1<f64>, Array2<f64>) {
    let means = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()));
    let centered = &x - &means.view().insert_axis(Axis(0));
    (means, centered)
}

pub fn fit_ols(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<OlsFit, FitError> {
    let n = y.len();
    if n == 0 || x.nrows() != n {
        return Err(FitError::InsufficientData {
            rows: n.min(x.nrows()),
            required: x.ncols() + 1,
        });
    }
    let y_mean = y.sum() / n as f64;

    if x.ncols() == 0 {
        let rss = y.iter().map(|v| (v - y_mean).powi(2)).sum();
        return Ok(OlsFit {
            intercept: y_mean,
            coefficients: Array1::zeros(0),
            rss,
        });
    }
    if n <= x.ncols() {
        return Err(FitError::InsufficientData {
            rows: n,
            required: x.ncols() + 1,
        });
    }

    let (means, xc) = center_columns(x);
    let yc = &y - y_mean;
    let gram = xc.t().dot(&xc);
    if let Some(j) = gram.diag().iter().position(|&d| d <= f64::EPSILON * n as f64) {
        return Err(FitError::SingularDesignMatrix(format!(
            "predictor column {j} has no variance"
        )));
    }
    let rhs = xc.t().dot(&yc);
    let factorized = gram
        .factorizec(UPLO::Lower)
        .map_err(|e| FitError::SingularDesignMatrix(e.to_string()))?;
    let largest = gram.diag().fold(0.0_f64, |acc, &d| acc.max(d));
    let smallest_pivot = factorized
        .factor
        .diag()
        .fold(f64::INFINITY, |acc, &l| acc.min(l * l));
    if smallest_pivot < PIVOT_TOLERANCE * largest {
        return Err(FitError::SingularDesignMatrix(format!(
            "Cholesky pivot {smallest_pivot:.3e} is negligible next to {largest:.3e}"
        )));
    }
    let coefficients = factorized
        .solvec(&rhs)
        .map_err(|e| FitError::SingularDesignMatrix(e.to_string()))?;
    if coefficients.iter().any(|b| !b.is_finite()) {
        return Err(FitError::SingularDesignMatrix(
            "Cholesky solve produced non-finite coefficients".to_string(),
        ));
    }

    let intercept = y_mean - means.dot(&coefficients);
    let residuals = &yc - &xc.dot(&coefficients);
    let rss = residuals.dot(&residuals);

    Ok(OlsFit {
        intercept,
        coefficients,
        rss,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_recovers_exact_plane() {
        let x = array![
            [1.0, 0.0],
            [2.0, 1.0],
            [3.0, 0.0],
            [4.0, 1.0],
            [5.0, 3.0],
            [6.0, 2.0]
        ];
        let y = x.column(0).mapv(|a| 2.0 + 0.5 * a) - x.column(1).mapv(|b| 1.5 * b);
        let fit = fit_ols(x.view(), y.view()).unwrap();
        assert_abs_diff_eq!(fit.intercept, 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.coefficients[0], 0.5, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.coefficients[1], -1.5, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.rss, 0.0, epsilon = 1e-16);
        assert_abs_diff_eq!(fit.predict(x.view())[4], y[4], epsilon = 1e-10);
    }

    #[test]
    fn test_intercept_only_model() {
        let x = Array2::zeros((4, 0));
        let y = array![1.0, 2.0, 3.0, 6.0];
        let fit = fit_ols(x.view(), y.view()).unwrap();
        assert_abs_diff_eq!(fit.intercept, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.rss, 14.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_column_is_singular() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [4.0, 5.0]];
        let y = array![1.0, 2.0, 2.5, 4.0];
        assert!(matches!(
            fit_ols(x.view(), y.view()),
            Err(FitError::SingularDesignMatrix(_))
        ));
    }

    #[test]
    fn test_duplicated_column_is_singular() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [4.0, 4.0], [7.0, 7.0], [3.0, 3.0]];
        let y = array![1.0, 2.0, 2.5, 4.0, 3.0];
        assert!(matches!(
            fit_ols(x.view(), y.view()),
            Err(FitError::SingularDesignMatrix(_))
        ));
    }

    #[test]
    fn test_too_few_rows() {
        let x = array![[1.0, 2.0], [2.0, 1.0]];
        let y = array![1.0, 2.0];
        assert_eq!(
            fit_ols(x.view(), y.view()).unwrap_err(),
            FitError::InsufficientData {
                rows: 2,
                required: 3
            }
        );
    }
}
