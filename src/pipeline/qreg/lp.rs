//! Linear-programming form of weighted quantile regression
//!
//! min  sum_i w_i (tau * u_i + (1 - tau) * v_i)
//! s.t. x_i' beta + u_i - v_i = y_i,  u, v >= 0,  beta free
//!
//! Solved with HiGHS through good_lp.

use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, Solution, SolverModel,
    Variable,
};

use super::{Design, EstimationError};

/// Solve for the coefficient vector at quantile `tau` under `weights`
/// (one weight per design row, zero allowed).
pub fn solve_coefficients(
    design: &Design,
    weights: &[f64],
    tau: f64,
) -> Result<Vec<f64>, EstimationError> {
    let n = design.n_obs();
    let k = design.n_params();

    // scale to mean 1; the minimiser is unchanged
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(EstimationError::Solver("weights sum to zero".to_string()));
    }
    let scale = n as f64 / total;

    let mut vars = ProblemVariables::new();
    let beta: Vec<Variable> = (0..k).map(|_| vars.add(variable())).collect();
    let u: Vec<Variable> = (0..n).map(|_| vars.add(variable().min(0.0))).collect();
    let v: Vec<Variable> = (0..n).map(|_| vars.add(variable().min(0.0))).collect();

    let objective: Expression = (0..n)
        .map(|i| {
            let w = weights[i] * scale;
            (w * tau) * u[i] + (w * (1.0 - tau)) * v[i]
        })
        .sum();

    let mut problem = vars.minimise(objective).using(default_solver);

    for i in 0..n {
        let fitted: Expression = (0..k).map(|j| design.x[(i, j)] * beta[j]).sum();
        let lhs = fitted + u[i] - v[i];
        problem = problem.with(constraint!(lhs == design.y[i]));
    }

    let solution = problem
        .solve()
        .map_err(|e| EstimationError::Solver(e.to_string()))?;

    Ok(beta.iter().map(|b| solution.value(*b)).collect())
}

/// Check loss `rho_tau(r) = r * (tau - 1{r < 0})`
#[inline]
pub fn check_loss(r: f64, tau: f64) -> f64 {
    if r < 0.0 {
        r * (tau - 1.0)
    } else {
        r * tau
    }
}

/// Weighted sum of check losses
pub fn objective_value(residuals: &[f64], weights: &[f64], tau: f64) -> f64 {
    residuals
        .iter()
        .zip(weights)
        .map(|(r, w)| w * check_loss(*r, tau))
        .sum()
}

/// Weighted tau-quantile of `values`: the smallest value whose cumulative
/// weight reaches `tau` of the total. This is the intercept-only fit.
pub fn weighted_quantile(values: &[f64], weights: &[f64], tau: f64) -> Option<f64> {
    let mut pairs: Vec<(f64, f64)> = values
        .iter()
        .zip(weights)
        .filter(|(_, w)| **w > 0.0)
        .map(|(v, w)| (*v, *w))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    let target = tau * total;
    let mut cumulative = 0.0;
    for (value, w) in &pairs {
        cumulative += w;
        if cumulative >= target - 1e-12 * total {
            return Some(*value);
        }
    }
    pairs.last().map(|(v, _)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_loss() {
        assert_eq!(check_loss(2.0, 0.5), 1.0);
        assert_eq!(check_loss(-2.0, 0.5), 1.0);
        assert!((check_loss(-2.0, 0.25) - 1.5).abs() < 1e-12);
        assert!((check_loss(2.0, 0.25) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_quantile_unit_weights() {
        let values = [5.0, 1.0, 3.0, 2.0, 4.0];
        let weights = [1.0; 5];
        assert_eq!(weighted_quantile(&values, &weights, 0.5), Some(3.0));
    }

    #[test]
    fn test_weighted_quantile_heavy_point() {
        let values = [1.0, 2.0, 3.0];
        let weights = [1.0, 1.0, 10.0];
        assert_eq!(weighted_quantile(&values, &weights, 0.5), Some(3.0));
        assert_eq!(weighted_quantile(&values, &[0.0, 0.0, 0.0], 0.5), None);
    }
}
