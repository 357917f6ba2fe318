//! Model grid: every outcome under both literacy specifications
//!
//! Each (outcome, literacy) pair is fitted on its own complete cases. A
//! failing pair is recorded and the rest of the grid still runs.

use std::collections::BTreeSet;

use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;

use super::loader::IMPLICATE_COLUMN;
use super::qreg::lp::solve_coefficients;
use super::qreg::{
    build_design, fit_quantile, Coefficient, Design, EstimationError, QuantileFit, StdErrorMethod,
};
use super::transform::analysis_sample;
use super::weights::replicate_weights;
use super::winsorize::int_values;
use crate::config::AnalysisConfig;
use crate::utils::progress::{create_fit_bar, finish_fit_bar};

/// How financial literacy enters the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteracySpec {
    /// Number of correct answers, 0..=3
    Score,
    /// Indicator for all three correct
    AllCorrect,
}

impl LiteracySpec {
    pub const ALL: [LiteracySpec; 2] = [LiteracySpec::Score, LiteracySpec::AllCorrect];

    /// Column holding this regressor
    pub fn column<'a>(&self, config: &'a AnalysisConfig) -> &'a str {
        match self {
            LiteracySpec::Score => &config.literacy.score_column,
            LiteracySpec::AllCorrect => &config.literacy.all_correct_column,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            LiteracySpec::Score => "Financial literacy score",
            LiteracySpec::AllCorrect => "All three literacy questions correct",
        }
    }
}

/// One cell of the model grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitSpec {
    pub outcome: String,
    pub literacy: LiteracySpec,
}

impl FitSpec {
    /// Literacy regressor first, then the controls
    pub fn regressors(&self, config: &AnalysisConfig) -> Vec<String> {
        let mut regressors = vec![self.literacy.column(config).to_string()];
        regressors.extend(config.model.controls.iter().cloned());
        regressors
    }
}

/// A fitted pair, or the reason it could not be fitted
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub spec: FitSpec,
    pub result: Result<QuantileFit, EstimationError>,
}

impl FitOutcome {
    pub fn fit(&self) -> Option<&QuantileFit> {
        self.result.as_ref().ok()
    }
}

/// Literacy-major list of every (outcome, literacy) pair
pub fn model_grid(config: &AnalysisConfig) -> Vec<FitSpec> {
    LiteracySpec::ALL
        .iter()
        .flat_map(|literacy| {
            config.model.outcomes.iter().map(move |outcome| FitSpec {
                outcome: outcome.clone(),
                literacy: *literacy,
            })
        })
        .collect()
}

/// Refit under each replicate weight (in parallel) and return the coefficient vectors
fn replicate_estimates(
    sample: &DataFrame,
    design: &Design,
    config: &AnalysisConfig,
) -> Result<Vec<Vec<f64>>, EstimationError> {
    let columns = config.replicate_columns();
    let replicates = replicate_weights(sample, &columns)
        .map_err(|e| EstimationError::InvalidWeights(e.to_string()))?;

    replicates
        .par_iter()
        .map(|weights| {
            let w: Vec<f64> = design.rows.iter().map(|&row| weights[row]).collect();
            solve_coefficients(design, &w, config.model.quantile)
        })
        .collect()
}

/// Fit one pair on `sample`
pub fn fit_spec(
    sample: &DataFrame,
    spec: &FitSpec,
    config: &AnalysisConfig,
) -> Result<QuantileFit, EstimationError> {
    let design = build_design(
        sample,
        &spec.outcome,
        &spec.regressors(config),
        &config.model.weight,
    )?;
    let mut fit = fit_quantile(&design, config.model.quantile)?;

    if config.model.replicates > 0 {
        let betas = replicate_estimates(sample, &design, config)?;
        fit.apply_replicate_errors(&betas);
    }
    Ok(fit)
}

fn log_outcome(outcome: &FitOutcome, config: &AnalysisConfig) {
    let literacy = outcome.spec.literacy.column(config);
    match &outcome.result {
        Ok(fit) => {
            if let Some(coef) = fit.coefficient(literacy) {
                log::info!(
                    "{} on {}: {:.4} (se {:.4}, p {:.3}), n = {}",
                    fit.outcome,
                    literacy,
                    coef.estimate,
                    coef.std_error,
                    coef.p_value.unwrap_or(f64::NAN),
                    fit.observations
                );
            }
        }
        Err(e) => log::warn!("{} on {} failed: {}", outcome.spec.outcome, literacy, e),
    }
}

/// Fit the whole grid on a single-implicate sample, one pair at a time.
pub fn estimate_models(sample: &DataFrame, config: &AnalysisConfig) -> Vec<FitOutcome> {
    let grid = model_grid(config);
    let pb = create_fit_bar(grid.len(), "Fitting quantile regressions");

    let outcomes: Vec<FitOutcome> = grid
        .into_iter()
        .map(|spec| {
            pb.set_message(format!("Fitting {}", spec.outcome));
            let result = fit_spec(sample, &spec, config);
            pb.inc(1);
            let outcome = FitOutcome { spec, result };
            log_outcome(&outcome, config);
            outcome
        })
        .collect();

    let fitted = outcomes.iter().filter(|o| o.result.is_ok()).count();
    finish_fit_bar(&pb, fitted, outcomes.len());
    outcomes
}

fn mean_of(fits: &[QuantileFit], f: impl Fn(&QuantileFit) -> f64) -> f64 {
    fits.iter().map(f).sum::<f64>() / fits.len() as f64
}

/// Combine per-implicate fits with Rubin's rules:
/// `T = mean(se^2) + (1 + 1/M) * var(beta)`
pub fn pool_fits(fits: &[QuantileFit]) -> Option<QuantileFit> {
    let first = fits.first()?;
    if fits.len() == 1 {
        return Some(first.clone());
    }
    let m = fits.len() as f64;

    let coefficients = first
        .coefficients
        .iter()
        .enumerate()
        .map(|(j, c)| {
            let estimate = mean_of(fits, |fit| fit.coefficients[j].estimate);
            let within = mean_of(fits, |fit| fit.coefficients[j].std_error.powi(2));
            let between = fits
                .iter()
                .map(|fit| (fit.coefficients[j].estimate - estimate).powi(2))
                .sum::<f64>()
                / (m - 1.0);
            let total = within + (1.0 + 1.0 / m) * between;
            Coefficient::new(c.name.clone(), estimate, total.sqrt())
        })
        .collect();

    Some(QuantileFit {
        outcome: first.outcome.clone(),
        quantile: first.quantile,
        observations: first.observations,
        sum_weights: mean_of(fits, |fit| fit.sum_weights),
        coefficients,
        pseudo_r2: mean_of(fits, |fit| fit.pseudo_r2),
        objective: mean_of(fits, |fit| fit.objective),
        bandwidth: mean_of(fits, |fit| fit.bandwidth),
        std_error_method: StdErrorMethod::Pooled,
        solve_time_ms: fits.iter().map(|fit| fit.solve_time_ms).sum(),
    })
}

/// Fit the grid on every implicate (implicates in parallel) and pool.
pub fn estimate_pooled(
    frame: &DataFrame,
    config: &AnalysisConfig,
) -> anyhow::Result<Vec<FitOutcome>> {
    let implicates: Vec<i64> = int_values(frame, IMPLICATE_COLUMN)?
        .into_iter()
        .flatten()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let samples: Vec<DataFrame> = implicates
        .iter()
        .map(|&i| analysis_sample(frame, i))
        .collect::<anyhow::Result<_>>()?;

    let grid = model_grid(config);
    let pb = create_fit_bar(grid.len(), "Fitting pooled regressions");

    let outcomes: Vec<FitOutcome> = grid
        .into_iter()
        .map(|spec| {
            pb.set_message(format!("Fitting {} x{}", spec.outcome, samples.len()));
            let fits: Result<Vec<QuantileFit>, EstimationError> = samples
                .par_iter()
                .map(|sample| fit_spec(sample, &spec, config))
                .collect();
            let result = fits.and_then(|fits| {
                pool_fits(&fits).ok_or_else(|| EstimationError::InsufficientObservations {
                    outcome: spec.outcome.clone(),
                    observations: 0,
                    parameters: 0,
                })
            });
            pb.inc(1);
            let outcome = FitOutcome { spec, result };
            log_outcome(&outcome, config);
            outcome
        })
        .collect();

    let fitted = outcomes.iter().filter(|o| o.result.is_ok()).count();
    finish_fit_bar(&pb, fitted, outcomes.len());
    log::info!("Pooled {} models over {} implicates", fitted, implicates.len());
    Ok(outcomes)
}
