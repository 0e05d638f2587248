//! # Model Evaluation
//!
//! Metrics for a fitted [`LinearModel`] on a design matrix. The two scales are
//! kept apart on purpose and every field name says which one it uses:
//!
//! - `rmse_charges` back-transforms the log prediction with `exp` and measures
//!   error in the original currency units.
//! - `r_squared_log` and `adj_r_squared_log` are computed on `ln(charges)`, the
//!   scale the models are fitted on. Every family reports adjusted R² on this
//!   scale so the numbers are comparable across the report.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::encode::DesignMatrix;
use crate::model::{FitError, LinearModel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Rows evaluated.
    pub n: usize,
    /// Predictors with non-zero weight.
    pub p: usize,
    pub rmse_charges: f64,
    pub r_squared_log: f64,
    /// Undefined (absent) when `n - p - 1 <= 0`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adj_r_squared_log: Option<f64>,
}

pub fn evaluate(model: &LinearModel, design: &DesignMatrix) -> Result<Metrics, FitError> {
    let predicted_log = model.predict_log(design.x.view())?;
    let predicted_charges = predicted_log.mapv(f64::exp);

    let n = design.n_rows();
    let p = model.nonzero_count();
    let r2 = r_squared(design.y.view(), predicted_log.view());

    Ok(Metrics {
        n,
        p,
        rmse_charges: rmse(design.charges.view(), predicted_charges.view()),
        r_squared_log: r2,
        adj_r_squared_log: adjusted_r_squared(r2, n, p),
    })
}

pub fn rmse(observed: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    if observed.is_empty() {
        return f64::NAN;
    }
    let sse: f64 = observed
        .iter()
        .zip(predicted.iter())
        .map(|(o, p)| (o - p).powi(2))
        .sum();
    (sse / observed.len() as f64).sqrt()
}

/// `1 - SS_res / SS_tot`; a response with no spread yields 0.
pub fn r_squared(observed: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let Some(mean) = observed.mean() else {
        return f64::NAN;
    };
    let ss_tot: f64 = observed.iter().map(|o| (o - mean).powi(2)).sum();
    let ss_res: f64 = observed
        .iter()
        .zip(predicted.iter())
        .map(|(o, p)| (o - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

pub fn adjusted_r_squared(r2: f64, n: usize, p: usize) -> Option<f64> {
    if n <= p + 1 {
        return None;
    }
    Some(1.0 - (1.0 - r2) * (n as f64 - 1.0) / (n as f64 - p as f64 - 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2, array};

    fn exact_design() -> (LinearModel, DesignMatrix) {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 0.0]];
        let model = LinearModel {
            columns: vec!["age".into(), "smokeryes".into()],
            intercept: 7.0,
            coefficients: array![0.1, 1.2],
        };
        let log_charges = model.predict_log(x.view()).unwrap();
        let design =
            DesignMatrix::from_parts(model.columns.clone(), x, log_charges.mapv(f64::exp))
                .unwrap();
        (model, design)
    }

    #[test]
    fn test_zero_error_model_has_zero_rmse() {
        let (model, design) = exact_design();
        let metrics = evaluate(&model, &design).unwrap();
        assert_abs_diff_eq!(metrics.rmse_charges, 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(metrics.r_squared_log, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(metrics.adj_r_squared_log.unwrap(), 1.0, epsilon = 1e-12);
        assert_eq!(metrics.n, 5);
        assert_eq!(metrics.p, 2);
    }

    #[test]
    fn test_rmse_is_on_original_scale() {
        let (mut model, design) = exact_design();
        // Shifting the log prediction by ln 2 doubles every predicted charge.
        model.intercept += 2.0_f64.ln();
        let metrics = evaluate(&model, &design).unwrap();
        let expected = rmse(design.charges.view(), (&design.charges * 2.0).view());
        assert_abs_diff_eq!(metrics.rmse_charges, expected, epsilon = 1e-6);
        let mean_charge = design.charges.mean().unwrap();
        assert!(metrics.rmse_charges > 0.5 * mean_charge);
    }

    #[test]
    fn test_r_squared_and_adjustment() {
        let observed = array![1.0, 2.0, 3.0, 4.0];
        let predicted = array![1.5, 1.5, 3.5, 3.5];
        let r2 = r_squared(observed.view(), predicted.view());
        assert_abs_diff_eq!(r2, 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(
            adjusted_r_squared(r2, 4, 1).unwrap(),
            1.0 - 0.2 * 3.0 / 2.0,
            epsilon = 1e-12
        );
        assert_eq!(adjusted_r_squared(r2, 4, 3), None);
    }

    #[test]
    fn test_constant_response_r_squared() {
        let observed = Array1::from_elem(3, 2.0);
        assert_eq!(r_squared(observed.view(), observed.view()), 0.0);
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let (model, _) = exact_design();
        let design = DesignMatrix::from_parts(
            vec!["age".into()],
            Array2::ones((2, 1)),
            array![1.0, 2.0],
        )
        .unwrap();
        assert!(matches!(
            evaluate(&model, &design),
            Err(FitError::DimensionMismatch { .. })
        ));
    }
}
