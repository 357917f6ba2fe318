//! Survey weight extraction and validation

use anyhow::{bail, Result};
use polars::prelude::*;

/// Extract a survey weight column as `Option<f64>` values.
///
/// # Behavior
/// - Null weights stay `None` (the row is dropped from regressions) and
///   are reported with a warning
/// - Negative, NaN or infinite weights are an error
pub fn survey_weights(df: &DataFrame, weight_column: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(weight_column).map_err(|_| {
        anyhow::anyhow!("Weight column '{}' not found in DataFrame", weight_column)
    })?;

    let float_col = column.cast(&DataType::Float64).map_err(|_| {
        anyhow::anyhow!(
            "Weight column '{}' must be numeric (cannot cast to Float64)",
            weight_column
        )
    })?;
    let ca = float_col.f64()?;

    let mut weights = Vec::with_capacity(df.height());
    let mut null_count = 0usize;

    for opt_val in ca.iter() {
        match opt_val {
            Some(w) => {
                validate_weight(weight_column, w)?;
                weights.push(Some(w));
            }
            None => {
                null_count += 1;
                weights.push(None);
            }
        }
    }

    if null_count > 0 {
        log::warn!(
            "Weight column '{}' contains {} null value(s); those rows are excluded from estimation",
            weight_column,
            null_count
        );
    }

    Ok(weights)
}

/// Extract replicate weight columns, one `Vec` per replicate. Nulls count
/// as zero weight (the household is out of that replicate).
pub fn replicate_weights(df: &DataFrame, columns: &[String]) -> Result<Vec<Vec<f64>>> {
    columns
        .iter()
        .map(|name| {
            let values = survey_weights(df, name)?;
            Ok(values.into_iter().map(|w| w.unwrap_or(0.0)).collect())
        })
        .collect()
}

fn validate_weight(column: &str, w: f64) -> Result<()> {
    if w.is_nan() {
        bail!(
            "Weight column '{}' contains NaN value. All weights must be valid numbers.",
            column
        );
    }
    if w.is_infinite() {
        bail!(
            "Weight column '{}' contains infinite value. All weights must be finite.",
            column
        );
    }
    if w < 0.0 {
        bail!(
            "Weight column '{}' contains negative value: {}. All weights must be non-negative.",
            column,
            w
        );
    }
    Ok(())
}
