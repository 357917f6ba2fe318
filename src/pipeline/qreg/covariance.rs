//! Kernel sandwich covariance for quantile regression coefficients
//!
//! Cov(beta) = A^-1 B A^-1 with
//!   A = sum_i w_i f_i x_i x_i'          (f_i: uniform kernel density at r_i)
//!   B = tau (1 - tau) sum_i w_i^2 x_i x_i'
//!
//! The kernel half-width is the Hall-Sheather bandwidth mapped onto the
//! residual scale. The result does not depend on how weights are scaled.

use faer::linalg::solvers::SolverCore;
use faer::Mat;

use super::super::winsorize::percentile;
use super::inference::{normal_pdf, normal_quantile};
use super::{Design, EstimationError};

/// Coverage level used by the Hall-Sheather rule
const BANDWIDTH_ALPHA: f64 = 0.05;

/// Variance inflation above which the kernel-weighted design counts as singular
const MAX_INFLATION: f64 = 1e10;

/// Covariance matrix plus the kernel half-width it was computed with
#[derive(Debug, Clone)]
pub struct KernelCovariance {
    pub matrix: Mat<f64>,
    pub bandwidth: f64,
}

/// Hall-Sheather bandwidth on the probability scale
pub fn hall_sheather(n: usize, tau: f64) -> f64 {
    let z = normal_quantile(1.0 - BANDWIDTH_ALPHA / 2.0);
    let q = normal_quantile(tau);
    let f = normal_pdf(q);
    (n as f64).powf(-1.0 / 3.0)
        * z.powf(2.0 / 3.0)
        * ((1.5 * f * f) / (2.0 * q * q + 1.0)).powf(1.0 / 3.0)
}

/// Kernel half-width on the residual scale:
/// `min(sd, IQR / 1.34) * (Q(tau + h) - Q(tau - h))`
pub fn residual_bandwidth(residuals: &[f64], tau: f64) -> f64 {
    let n = residuals.len();
    let h = hall_sheather(n, tau);
    let lo = (tau - h).max(1e-6);
    let hi = (tau + h).min(1.0 - 1e-6);

    let mean = residuals.iter().sum::<f64>() / n as f64;
    let sd = (residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
        / (n as f64 - 1.0).max(1.0))
    .sqrt();
    let iqr = match (percentile(residuals, 75.0), percentile(residuals, 25.0)) {
        (Some(q3), Some(q1)) => q3 - q1,
        _ => 0.0,
    };
    let kappa = if iqr > 0.0 { sd.min(iqr / 1.34) } else { sd };

    kappa * (normal_quantile(hi) - normal_quantile(lo))
}

/// Sandwich covariance of the coefficients fitted on `design`.
///
/// # Errors
/// `SingularDesign` when the kernel window is empty or `A` is not
/// positive definite (collinear regressors, a constant dummy, ...).
pub fn kernel_sandwich(
    design: &Design,
    residuals: &[f64],
    tau: f64,
) -> Result<KernelCovariance, EstimationError> {
    let n = design.n_obs();
    let k = design.n_params();
    let singular = || EstimationError::SingularDesign {
        outcome: design.outcome.clone(),
    };

    let bandwidth = residual_bandwidth(residuals, tau);
    if !bandwidth.is_finite() || bandwidth <= 0.0 {
        return Err(singular());
    }

    // rows pre-scaled so that A = Xa'Xa and B = Xb'Xb
    let mut xa = Mat::<f64>::zeros(n, k);
    let mut xb = Mat::<f64>::zeros(n, k);
    let psi = (tau * (1.0 - tau)).sqrt();
    for i in 0..n {
        let w = design.w[i];
        let density = if residuals[i].abs() < bandwidth {
            1.0 / (2.0 * bandwidth)
        } else {
            0.0
        };
        let sa = (w * density).sqrt();
        let sb = w * psi;
        for j in 0..k {
            xa[(i, j)] = sa * design.x[(i, j)];
            xb[(i, j)] = sb * design.x[(i, j)];
        }
    }

    let a = xa.transpose() * &xa;
    let b = xb.transpose() * &xb;

    let a_inv = a
        .cholesky(faer::Side::Lower)
        .map_err(|_| singular())?
        .inverse();

    // a_jj * (A^-1)_jj is the variance inflation of column j; rounding can
    // let a collinear A through the factorization
    for j in 0..k {
        let inflation = a[(j, j)] * a_inv[(j, j)];
        if !(0.5..=MAX_INFLATION).contains(&inflation) {
            return Err(singular());
        }
    }
    let matrix = &a_inv * &b * &a_inv;

    Ok(KernelCovariance { matrix, bandwidth })
}
