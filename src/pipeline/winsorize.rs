//! Percentile clipping within implicate groups
//!
//! Cutoffs are computed separately for every implicate from that
//! implicate's own rows; a value is never clipped against another
//! implicate's percentiles.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use polars::prelude::*;
use serde::Serialize;

/// Percentile of the non-missing values using linear interpolation between
/// order statistics (rank `p/100 * (n-1)`). NaN values are ignored.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    if n == 1 {
        return Some(sorted[0]);
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        Some(sorted[lower])
    } else {
        let w = rank - lower as f64;
        Some(sorted[lower] + w * (sorted[upper] - sorted[lower]))
    }
}

/// Cutoffs applied to one implicate of one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WinsorBounds {
    pub low: f64,
    pub high: f64,
    /// Values moved to one of the two cutoffs
    pub clipped: usize,
}

/// Winsorize `values` independently within each group.
///
/// Rows with a null value stay null and do not enter the percentile
/// computation; rows with a null group are left untouched.
pub fn winsorize_grouped(
    values: &[Option<f64>],
    groups: &[Option<i64>],
    lower: f64,
    upper: f64,
) -> (Vec<Option<f64>>, BTreeMap<i64, WinsorBounds>) {
    let mut members: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for (value, group) in values.iter().zip(groups) {
        if let (Some(v), Some(g)) = (value, group) {
            members.entry(*g).or_default().push(*v);
        }
    }

    let mut bounds: BTreeMap<i64, WinsorBounds> = BTreeMap::new();
    for (group, group_values) in &members {
        if let (Some(low), Some(high)) = (
            percentile(group_values, lower),
            percentile(group_values, upper),
        ) {
            // rounding must never leave the upper cutoff below the lower one
            let high = high.max(low);
            bounds.insert(*group, WinsorBounds { low, high, clipped: 0 });
        }
    }

    let clipped: Vec<Option<f64>> = values
        .iter()
        .zip(groups)
        .map(|(value, group)| match (value, group) {
            (Some(v), Some(g)) => match bounds.get_mut(g) {
                Some(b) => {
                    let c = v.max(b.low).min(b.high);
                    if c != *v {
                        b.clipped += 1;
                    }
                    Some(c)
                }
                None => Some(*v),
            },
            _ => *value,
        })
        .collect();

    (clipped, bounds)
}

/// Per-column, per-implicate cutoffs of a transformation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct WinsorReport {
    pub lower_pct: f64,
    pub upper_pct: f64,
    pub columns: BTreeMap<String, BTreeMap<i64, WinsorBounds>>,
}

impl WinsorReport {
    pub fn new(lower_pct: f64, upper_pct: f64) -> Self {
        Self {
            lower_pct,
            upper_pct,
            columns: BTreeMap::new(),
        }
    }

    pub fn total_clipped(&self) -> usize {
        self.columns
            .values()
            .flat_map(|groups| groups.values())
            .map(|b| b.clipped)
            .sum()
    }
}

/// Read a column as `Option<f64>` values
pub fn float_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let col = df
        .column(column)
        .with_context(|| format!("Column '{}' not found", column))?
        .cast(&DataType::Float64)
        .with_context(|| format!("Column '{}' must be numeric", column))?;
    Ok(col.f64()?.into_iter().collect())
}

/// Read a column as `Option<i64>` values
pub fn int_values(df: &DataFrame, column: &str) -> Result<Vec<Option<i64>>> {
    let col = df
        .column(column)
        .with_context(|| format!("Column '{}' not found", column))?
        .cast(&DataType::Int64)
        .with_context(|| format!("Column '{}' must be integer-valued", column))?;
    Ok(col.i64()?.into_iter().collect())
}

/// Winsorize each of `columns` in place, grouping rows by `group_column`.
pub fn winsorize_columns(
    df: &mut DataFrame,
    columns: &[String],
    group_column: &str,
    lower: f64,
    upper: f64,
    report: &mut WinsorReport,
) -> Result<()> {
    let groups = int_values(df, group_column)?;

    for column in columns {
        let values = float_values(df, column)?;
        let (clipped, bounds) = winsorize_grouped(&values, &groups, lower, upper);

        for (implicate, b) in &bounds {
            log::debug!(
                "winsorize {} implicate {}: [{:.2}, {:.2}], {} clipped",
                column,
                implicate,
                b.low,
                b.high,
                b.clipped
            );
        }

        df.with_column(Column::new(column.as_str().into(), clipped))?;
        report.columns.insert(column.clone(), bounds);
    }

    Ok(())
}
