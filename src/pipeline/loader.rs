//! Survey table loader for CSV, Parquet and Stata files
//!
//! Reads the main survey file, the summary extract and the weights file,
//! normalizes column names, keeps the configured columns and joins the three
//! into one table with an `implicate` column.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::*;

use super::error::PipelineError;
use super::stata::load_dta;
use crate::config::AnalysisConfig;

/// Name of the derived imputation-replicate column
pub const IMPLICATE_COLUMN: &str = "implicate";

/// Rows every household carries, one per implicate
pub const IMPLICATES_PER_HOUSEHOLD: usize = 5;

/// Paths of the three input tables
#[derive(Debug, Clone)]
pub struct SourcePaths {
    /// Full public data set (quiz answers)
    pub main: PathBuf,
    /// Summary extract (demographics, wealth, income, survey weight)
    pub summary: PathBuf,
    /// Household-level weights file
    pub weights: PathBuf,
}

/// Merged table plus row accounting for the console summary
#[derive(Debug)]
pub struct MergedSources {
    pub frame: DataFrame,
    pub main_rows: usize,
    pub summary_rows: usize,
    pub weights_rows: usize,
    /// Households left with fewer or more than five implicates
    pub incomplete_households: Vec<(i64, usize)>,
}

/// Load a dataset from a file (CSV, Parquet or Stata based on extension)
pub fn load_dataset(path: &Path, infer_schema_length: usize) -> Result<DataFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    // 0 means full table scan
    let schema_length = if infer_schema_length == 0 {
        None
    } else {
        Some(infer_schema_length)
    };

    let df = match extension.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_infer_schema_length(schema_length)
            .finish()
            .and_then(|lf| lf.collect())
            .with_context(|| format!("Failed to load CSV file: {}", path.display()))?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .and_then(|lf| lf.collect())
            .with_context(|| format!("Failed to load Parquet file: {}", path.display()))?,
        "dta" => load_dta(path)
            .with_context(|| format!("Failed to load Stata file: {}", path.display()))?,
        _ => anyhow::bail!(
            "Unsupported file format: {} ({}). Supported formats: csv, parquet, dta",
            extension,
            path.display()
        ),
    };

    Ok(df)
}

/// Lower-case every column name. Two names that differ only by case are an error.
pub fn normalize_column_names(df: &mut DataFrame, file: &str) -> Result<()> {
    let lowered: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_lowercase())
        .collect();

    let mut seen = std::collections::HashSet::new();
    for name in &lowered {
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::NameCollision {
                file: file.to_string(),
                column: name.clone(),
            }
            .into());
        }
    }

    df.set_column_names(lowered)?;
    Ok(())
}

/// Keep only `columns`, failing with the file name when one is absent
pub fn select_columns(df: &DataFrame, file: &str, columns: &[String]) -> Result<DataFrame> {
    for column in columns {
        if df.column(column).is_err() {
            return Err(PipelineError::MissingColumn {
                file: file.to_string(),
                column: column.clone(),
            }
            .into());
        }
    }
    Ok(df.select(columns.iter().map(|c| c.as_str()))?)
}

/// Count key values that occur more than once
fn duplicate_key_count(df: &DataFrame, key: &str) -> Result<usize> {
    let unique = df.column(key)?.as_materialized_series().n_unique()?;
    Ok(df.height() - unique)
}

fn ensure_unique_key(df: &DataFrame, file: &str, key: &str) -> Result<()> {
    let duplicates = duplicate_key_count(df, key)?;
    if duplicates > 0 {
        return Err(PipelineError::DuplicateKey {
            file: file.to_string(),
            key: key.to_string(),
            duplicates,
        }
        .into());
    }
    Ok(())
}

fn cast_keys(df: DataFrame, keys: &[&str]) -> Result<DataFrame> {
    let exprs: Vec<Expr> = keys
        .iter()
        .map(|k| col(*k).cast(DataType::Int64))
        .collect();
    Ok(df.lazy().with_columns(exprs).collect()?)
}

/// Read one input file and cut it down to its configured columns
fn prepare_source(
    path: &Path,
    file: &str,
    columns: &[String],
    keys: &[&str],
    infer_schema_length: usize,
) -> Result<DataFrame> {
    let mut df = load_dataset(path, infer_schema_length)?;
    normalize_column_names(&mut df, file)?;
    let df = select_columns(&df, file, columns)?;
    cast_keys(df, keys)
}

/// Column list of a source: its keys followed by its configured columns,
/// without repeating a key
fn with_keys(keys: &[&str], columns: &[String]) -> Vec<String> {
    let mut all: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    for c in columns {
        if !all.contains(c) {
            all.push(c.clone());
        }
    }
    all
}

/// Derive `implicate = person_id - 10 * household_id`, rejecting values outside 1..=5
pub fn derive_implicate(df: &mut DataFrame, household_id: &str, person_id: &str) -> Result<()> {
    let hh = df.column(household_id)?.cast(&DataType::Int64)?;
    let person = df.column(person_id)?.cast(&DataType::Int64)?;
    let hh = hh.i64()?;
    let person = person.i64()?;

    let mut implicates: Vec<Option<i64>> = Vec::with_capacity(df.height());
    for (h, p) in hh.into_iter().zip(person.into_iter()) {
        match (h, p) {
            (Some(h), Some(p)) => {
                let value = p - 10 * h;
                if !(1..=5).contains(&value) {
                    return Err(PipelineError::ImplicateOutOfRange { person_id: p, value }.into());
                }
                implicates.push(Some(value));
            }
            _ => implicates.push(None),
        }
    }

    df.with_column(Column::new(IMPLICATE_COLUMN.into(), implicates))?;
    Ok(())
}

/// Households whose row count differs from [`IMPLICATES_PER_HOUSEHOLD`],
/// with the number of rows each one has, ordered by household id
pub fn incomplete_households(df: &DataFrame, household_id: &str) -> Result<Vec<(i64, usize)>> {
    let hh = df.column(household_id)?.cast(&DataType::Int64)?;
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for h in hh.i64()?.into_iter().flatten() {
        *counts.entry(h).or_default() += 1;
    }
    Ok(counts
        .into_iter()
        .filter(|(_, n)| *n != IMPLICATES_PER_HOUSEHOLD)
        .collect())
}

/// Load and join the three survey tables.
///
/// Weights join to the main file by household id (many-to-one), then the
/// summary extract joins by person id (one-to-one). Both joins are inner:
/// rows without a partner are dropped and reported.
pub fn load_sources(
    paths: &SourcePaths,
    config: &AnalysisConfig,
    infer_schema_length: usize,
) -> Result<MergedSources> {
    let src = &config.sources;
    let hh = src.household_id.as_str();
    let person = src.person_id.as_str();

    let main = prepare_source(
        &paths.main,
        "main",
        &with_keys(&[person, hh], &src.main_columns),
        &[person, hh],
        infer_schema_length,
    )?;

    let mut weights_columns = src.weights_columns.clone();
    weights_columns.extend(config.replicate_columns());
    let weights = prepare_source(
        &paths.weights,
        "weights",
        &with_keys(&[hh], &weights_columns),
        &[hh],
        infer_schema_length,
    )?;

    let summary_columns: Vec<String> = src
        .summary_columns
        .iter()
        .filter(|c| c.as_str() != hh)
        .cloned()
        .collect();
    let summary = prepare_source(
        &paths.summary,
        "summary",
        &with_keys(&[person], &summary_columns),
        &[person],
        infer_schema_length,
    )?;

    ensure_unique_key(&weights, "weights", hh)?;
    ensure_unique_key(&summary, "summary", person)?;
    ensure_unique_key(&main, "main", person)?;

    let main_rows = main.height();
    let weights_rows = weights.height();
    let summary_rows = summary.height();

    let mut frame = main
        .lazy()
        .join(
            weights.lazy(),
            [col(hh)],
            [col(hh)],
            JoinArgs::new(JoinType::Inner),
        )
        .join(
            summary.lazy(),
            [col(person)],
            [col(person)],
            JoinArgs::new(JoinType::Inner),
        )
        .sort_by_exprs([col(person)], SortMultipleOptions::default())
        .collect()
        .context("Failed to join survey tables")?;

    if frame.height() < main_rows {
        log::warn!(
            "{} of {} main-file rows had no matching weights/summary record and were dropped",
            main_rows - frame.height(),
            main_rows
        );
    }

    derive_implicate(&mut frame, hh, person)?;

    let incomplete = incomplete_households(&frame, hh)?;
    if !incomplete.is_empty() {
        let listed: Vec<String> = incomplete
            .iter()
            .take(10)
            .map(|(h, n)| format!("{}: {}", h, n))
            .collect();
        log::warn!(
            "{} household(s) do not have {} implicates after the join ({}{})",
            incomplete.len(),
            IMPLICATES_PER_HOUSEHOLD,
            listed.join(", "),
            if incomplete.len() > listed.len() { ", ..." } else { "" }
        );
    }
    log::info!(
        "Merged {} rows x {} columns from main/weights/summary files",
        frame.height(),
        frame.width()
    );

    Ok(MergedSources {
        frame,
        main_rows,
        summary_rows,
        weights_rows,
        incomplete_households: incomplete,
    })
}
