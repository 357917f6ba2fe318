//! Weighted quantile regression
//!
//! Coefficients come from the linear-programming form solved with HiGHS
//! via good_lp; standard errors from a kernel sandwich built with faer.
//!
//! # Module Structure
//!
//! - `lp` - LP formulation and the check-loss helpers
//! - `covariance` - Kernel sandwich covariance and bandwidth selection
//! - `inference` - Normal CDF, quantile and p-values

pub mod covariance;
pub mod inference;
pub mod lp;

use std::time::Instant;

use faer::Mat;
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

use self::covariance::kernel_sandwich;
use self::inference::two_sided_p_value;
use self::lp::{objective_value, solve_coefficients, weighted_quantile};
use super::winsorize::float_values;

/// Name of the intercept term
pub const CONSTANT: &str = "_cons";

/// Errors raised while fitting one regression. These are per model: one
/// failed outcome does not stop the others.
#[derive(Error, Debug, Clone)]
pub enum EstimationError {
    #[error("Column '{column}' not found in the analysis sample")]
    MissingColumn { column: String },

    #[error("Column '{column}' is not numeric: {reason}")]
    InvalidColumn { column: String, reason: String },

    #[error("Invalid survey weights: {0}")]
    InvalidWeights(String),

    #[error("'{outcome}' has {observations} complete observation(s) for {parameters} parameter(s)")]
    InsufficientObservations {
        outcome: String,
        observations: usize,
        parameters: usize,
    },

    #[error("LP solver failed: {0}")]
    Solver(String),

    #[error("Design matrix for '{outcome}' is singular; a regressor is constant or collinear")]
    SingularDesign { outcome: String },
}

/// Complete-case design for one regression. The constant is the last column.
#[derive(Debug, Clone)]
pub struct Design {
    pub outcome: String,
    pub names: Vec<String>,
    pub x: Mat<f64>,
    pub y: Vec<f64>,
    pub w: Vec<f64>,
    /// Row of the source frame each design row came from
    pub rows: Vec<usize>,
}

impl Design {
    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    pub fn n_params(&self) -> usize {
        self.names.len()
    }

    /// `y - X beta`
    pub fn residuals(&self, beta: &[f64]) -> Vec<f64> {
        (0..self.n_obs())
            .map(|i| {
                let fitted: f64 = beta
                    .iter()
                    .enumerate()
                    .map(|(j, b)| self.x[(i, j)] * b)
                    .sum();
                self.y[i] - fitted
            })
            .collect()
    }
}

fn column_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>, EstimationError> {
    if df.column(column).is_err() {
        return Err(EstimationError::MissingColumn {
            column: column.to_string(),
        });
    }
    float_values(df, column).map_err(|e| EstimationError::InvalidColumn {
        column: column.to_string(),
        reason: e.to_string(),
    })
}

fn finite(value: Option<f64>) -> bool {
    matches!(value, Some(v) if v.is_finite())
}

/// Build the design for `outcome ~ regressors + constant`, dropping every
/// row with a missing or non-finite outcome, regressor or weight, or a
/// zero weight.
pub fn build_design(
    df: &DataFrame,
    outcome: &str,
    regressors: &[String],
    weight: &str,
) -> Result<Design, EstimationError> {
    let y_all = column_values(df, outcome)?;
    let x_all: Vec<Vec<Option<f64>>> = regressors
        .iter()
        .map(|r| column_values(df, r))
        .collect::<Result<_, _>>()?;
    let w_all = super::weights::survey_weights(df, weight).map_err(|e| {
        if df.column(weight).is_err() {
            EstimationError::MissingColumn {
                column: weight.to_string(),
            }
        } else {
            EstimationError::InvalidWeights(e.to_string())
        }
    })?;

    let rows: Vec<usize> = (0..df.height())
        .filter(|&i| {
            finite(y_all[i])
                && matches!(w_all[i], Some(w) if w > 0.0)
                && x_all.iter().all(|col| finite(col[i]))
        })
        .collect();

    let mut names = regressors.to_vec();
    names.push(CONSTANT.to_string());
    let k = names.len();
    let n = rows.len();

    if n <= k {
        return Err(EstimationError::InsufficientObservations {
            outcome: outcome.to_string(),
            observations: n,
            parameters: k,
        });
    }

    let mut x = Mat::<f64>::zeros(n, k);
    let mut y = Vec::with_capacity(n);
    let mut w = Vec::with_capacity(n);
    for (i, &row) in rows.iter().enumerate() {
        for (j, col) in x_all.iter().enumerate() {
            x[(i, j)] = col[row].unwrap_or_default();
        }
        x[(i, k - 1)] = 1.0;
        y.push(y_all[row].unwrap_or_default());
        w.push(w_all[row].unwrap_or_default());
    }

    let dropped = df.height() - n;
    if dropped > 0 {
        log::debug!(
            "{}: {} of {} row(s) dropped for missing values",
            outcome,
            dropped,
            df.height()
        );
    }

    Ok(Design {
        outcome: outcome.to_string(),
        names,
        x,
        y,
        w,
        rows,
    })
}

/// How a coefficient's standard error was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StdErrorMethod {
    Kernel,
    Replicate,
    Pooled,
}

/// One row of a regression table
#[derive(Debug, Clone, Serialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    /// `None` when the standard error is zero or not finite
    pub z: Option<f64>,
    /// `None` under the same condition as `z`; written as `null` in results.json
    pub p_value: Option<f64>,
}

impl Coefficient {
    /// A coefficient with its normal-approximation test statistic.
    ///
    /// A degenerate standard error (zero, negative or not finite, e.g. when
    /// every replicate refit returns the same estimate) has no test
    /// statistic, so `z` and `p_value` are left empty.
    pub fn new(name: String, estimate: f64, std_error: f64) -> Self {
        let z = (std_error.is_finite() && std_error > 0.0).then(|| estimate / std_error);
        Self {
            name,
            estimate,
            std_error,
            z,
            p_value: z.map(two_sided_p_value),
        }
    }
}

/// A fitted quantile regression
#[derive(Debug, Clone, Serialize)]
pub struct QuantileFit {
    pub outcome: String,
    pub quantile: f64,
    pub observations: usize,
    pub sum_weights: f64,
    pub coefficients: Vec<Coefficient>,
    /// Koenker-Machado pseudo R-squared
    pub pseudo_r2: f64,
    /// Weighted check loss at the solution
    pub objective: f64,
    /// Kernel half-width used for the standard errors
    pub bandwidth: f64,
    pub std_error_method: StdErrorMethod,
    pub solve_time_ms: u64,
}

impl QuantileFit {
    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }

    pub fn estimates(&self) -> Vec<f64> {
        self.coefficients.iter().map(|c| c.estimate).collect()
    }

    /// Replace the kernel standard errors with the replicate-weight ones:
    /// `se_j = sqrt(mean_r (beta_rj - beta_j)^2)`
    pub fn apply_replicate_errors(&mut self, replicates: &[Vec<f64>]) {
        if replicates.is_empty() {
            return;
        }
        let r = replicates.len() as f64;
        for (j, coef) in self.coefficients.iter_mut().enumerate() {
            let var = replicates
                .iter()
                .map(|beta| (beta[j] - coef.estimate).powi(2))
                .sum::<f64>()
                / r;
            *coef = Coefficient::new(coef.name.clone(), coef.estimate, var.sqrt());
        }
        self.std_error_method = StdErrorMethod::Replicate;
    }
}

/// Fit a weighted quantile regression at `tau` on a prepared design.
pub fn fit_quantile(design: &Design, tau: f64) -> Result<QuantileFit, EstimationError> {
    let start_time = Instant::now();
    let beta = solve_coefficients(design, &design.w, tau)?;
    let residuals = design.residuals(&beta);
    let covariance = kernel_sandwich(design, &residuals, tau)?;

    let objective = objective_value(&residuals, &design.w, tau);
    let pseudo_r2 = match weighted_quantile(&design.y, &design.w, tau) {
        Some(q) => {
            let null_residuals: Vec<f64> = design.y.iter().map(|y| y - q).collect();
            let null_objective = objective_value(&null_residuals, &design.w, tau);
            if null_objective > 0.0 {
                1.0 - objective / null_objective
            } else {
                0.0
            }
        }
        None => 0.0,
    };

    let coefficients = design
        .names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let se = covariance.matrix[(j, j)].max(0.0).sqrt();
            Coefficient::new(name.clone(), beta[j], se)
        })
        .collect();

    Ok(QuantileFit {
        outcome: design.outcome.clone(),
        quantile: tau,
        observations: design.n_obs(),
        sum_weights: design.w.iter().sum(),
        coefficients,
        pseudo_r2,
        objective,
        bandwidth: covariance.bandwidth,
        std_error_method: StdErrorMethod::Kernel,
        solve_time_ms: start_time.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_frame(n: usize) -> DataFrame {
        let x: Vec<f64> = (0..n).map(|i| i as f64 / 10.0).collect();
        // symmetric noise so the median line is exactly 2 + 3x
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, x)| 2.0 + 3.0 * x + if i % 3 == 0 { 0.0 } else if i % 3 == 1 { 1.0 } else { -1.0 })
            .collect();
        df! {
            "x" => x,
            "y" => y,
            "wgt" => vec![1.0f64; n],
        }
        .unwrap()
    }

    #[test]
    fn test_build_design_listwise_deletion() {
        let df = df! {
            "y" => [Some(1.0f64), None, Some(3.0), Some(4.0), Some(5.0)],
            "x" => [Some(1.0f64), Some(2.0), None, Some(4.0), Some(5.0)],
            "wgt" => [Some(1.0f64), Some(1.0), Some(1.0), Some(0.0), Some(2.0)],
        }
        .unwrap();
        let design = build_design(&df, "y", &["x".to_string()], "wgt").unwrap();
        assert_eq!(design.rows, vec![0, 4]);
        assert_eq!(design.names, vec!["x", "_cons"]);
        assert_eq!(design.x[(1, 1)], 1.0);
        assert_eq!(design.w, vec![1.0, 2.0]);
    }

    #[test]
    fn test_build_design_missing_column() {
        let df = linear_frame(10);
        let err = build_design(&df, "y", &["nope".to_string()], "wgt").unwrap_err();
        assert!(matches!(err, EstimationError::MissingColumn { ref column } if column == "nope"));
    }

    #[test]
    fn test_too_few_observations() {
        let df = linear_frame(2);
        let err = build_design(&df, "y", &["x".to_string()], "wgt").unwrap_err();
        assert!(matches!(err, EstimationError::InsufficientObservations { .. }));
    }

    #[test]
    fn test_zero_std_error_has_no_test_statistic() {
        let coef = Coefficient::new("finlit".to_string(), 0.4, 0.0);
        assert_eq!(coef.z, None);
        assert_eq!(coef.p_value, None);

        let json = serde_json::to_value(&coef).unwrap();
        assert!(json["p_value"].is_null());
        assert_eq!(json["std_error"], 0.0);
    }

    #[test]
    fn test_recovers_median_line() {
        let df = linear_frame(90);
        let design = build_design(&df, "y", &["x".to_string()], "wgt").unwrap();
        let fit = fit_quantile(&design, 0.5).unwrap();

        let slope = fit.coefficient("x").unwrap();
        let cons = fit.coefficient(CONSTANT).unwrap();
        assert!((slope.estimate - 3.0).abs() < 1e-6, "slope {}", slope.estimate);
        assert!((cons.estimate - 2.0).abs() < 1e-6, "cons {}", cons.estimate);
        assert!(slope.std_error > 0.0);
        assert!(slope.p_value.unwrap() < 0.01);
        assert!(fit.pseudo_r2 > 0.5 && fit.pseudo_r2 <= 1.0);
        assert_eq!(fit.observations, 90);
    }

    #[test]
    fn test_intercept_only_is_weighted_median() {
        let df = df! {
            "y" => [1.0f64, 2.0, 3.0, 4.0, 100.0],
            "wgt" => [1.0f64, 1.0, 1.0, 1.0, 1.0],
        }
        .unwrap();
        let design = build_design(&df, "y", &[], "wgt").unwrap();
        let beta = solve_coefficients(&design, &design.w, 0.5).unwrap();
        assert!((beta[0] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_replicate_errors_replace_kernel_errors() {
        let df = linear_frame(90);
        let design = build_design(&df, "y", &["x".to_string()], "wgt").unwrap();
        let mut fit = fit_quantile(&design, 0.5).unwrap();
        let est = fit.estimates();
        let reps = vec![
            vec![est[0] + 0.1, est[1]],
            vec![est[0] - 0.1, est[1]],
        ];
        fit.apply_replicate_errors(&reps);
        assert!((fit.coefficients[0].std_error - 0.1).abs() < 1e-9);
        assert_eq!(fit.coefficients[1].std_error, 0.0);
        assert_eq!(fit.std_error_method, StdErrorMethod::Replicate);
    }
}
