//! Derived-variable construction
//!
//! Order matters: raw wealth and income columns are winsorized first, the
//! wealth/income ratio is built from the clipped values and clipped again,
//! and only then are the `_100k` columns rescaled.

use anyhow::{Context, Result};
use polars::prelude::*;

use super::error::PipelineError;
use super::loader::IMPLICATE_COLUMN;
use super::winsorize::{float_values, int_values, winsorize_columns, WinsorReport};
use crate::config::{AnalysisConfig, QuizItem};

/// Divisor of the rescaled wealth columns
pub const RESCALE_DIVISOR: f64 = 100_000.0;

/// Name of the derived wealth-to-income ratio
pub const RATIO_COLUMN: &str = "wealth_income_ratio";

/// Raw columns rescaled after winsorization, with their output names
pub const RESCALED: &[(&str, &str)] = &[
    ("networth", "networth_100k"),
    ("fin", "fin_100k"),
    ("nfin", "nfin_100k"),
    ("income", "income_100k"),
];

/// A categorical source column recoded into dummies. The reference code
/// gets no dummy of its own.
#[derive(Debug, Clone, Copy)]
pub struct DummyGroup {
    pub source: &'static str,
    pub reference: i64,
    pub dummies: &'static [(&'static str, i64)],
}

/// Demographic recodes of the summary extract
pub const DUMMY_GROUPS: &[DummyGroup] = &[
    DummyGroup {
        source: "hhsex",
        reference: 1,
        dummies: &[("female", 2)],
    },
    DummyGroup {
        source: "racecl4",
        reference: 1,
        dummies: &[("black", 2), ("hispanic", 3), ("other_race", 4)],
    },
    DummyGroup {
        source: "edcl",
        reference: 4,
        dummies: &[("ed_lshs", 1), ("ed_hs", 2), ("ed_sc", 3)],
    },
    DummyGroup {
        source: "married",
        reference: 2,
        dummies: &[("is_married", 1)],
    },
    DummyGroup {
        source: "occat1",
        reference: 1,
        dummies: &[("self_employed", 2), ("retired", 3), ("not_working", 4)],
    },
];

/// Output of [`transform`]: every implicate, fully derived
#[derive(Debug)]
pub struct Transformed {
    pub frame: DataFrame,
    pub winsor: WinsorReport,
}

/// Recode one categorical column: 1 where the code matches, 0 otherwise,
/// null where the source is null
pub fn dummy_values(codes: &[Option<i64>], code: i64) -> Vec<Option<i32>> {
    codes
        .iter()
        .map(|c| c.map(|c| i32::from(c == code)))
        .collect()
}

/// Add every dummy of [`DUMMY_GROUPS`] to the frame
pub fn derive_dummies(df: &mut DataFrame) -> Result<()> {
    for group in DUMMY_GROUPS {
        let codes = int_values(df, group.source)
            .with_context(|| format!("Cannot recode '{}' into dummies", group.source))?;
        for (name, code) in group.dummies {
            df.with_column(Column::new((*name).into(), dummy_values(&codes, *code)))?;
        }
    }
    Ok(())
}

/// Count of correct quiz answers; null when any answer is missing
pub fn literacy_score(df: &DataFrame, items: &[QuizItem]) -> Result<Vec<Option<i64>>> {
    let mut score: Vec<Option<i64>> = vec![Some(0); df.height()];
    for item in items {
        let answers = int_values(df, &item.column)
            .with_context(|| format!("Cannot score quiz item '{}'", item.column))?;
        for (s, answer) in score.iter_mut().zip(answers) {
            *s = match (*s, answer) {
                (Some(total), Some(a)) => Some(total + i64::from(a == item.correct)),
                _ => None,
            };
        }
    }
    Ok(score)
}

/// Build the score column (from quiz items, or validate an existing one)
/// and the all-correct indicator
pub fn derive_literacy(df: &mut DataFrame, config: &AnalysisConfig) -> Result<()> {
    let lit = &config.literacy;

    let score = if lit.items.is_empty() {
        let existing = int_values(df, &lit.score_column)?;
        if let Some(value) = existing.iter().flatten().find(|v| !(0..=3).contains(*v)) {
            return Err(PipelineError::ScoreOutOfRange {
                column: lit.score_column.clone(),
                value: *value,
            }
            .into());
        }
        existing
    } else {
        literacy_score(df, &lit.items)?
    };

    let all_correct: Vec<Option<i32>> = score.iter().map(|s| s.map(|s| i32::from(s == 3))).collect();

    df.with_column(Column::new(lit.score_column.as_str().into(), score))?;
    df.with_column(Column::new(lit.all_correct_column.as_str().into(), all_correct))?;
    Ok(())
}

/// `networth / income`; null when income is zero or either side is missing
pub fn wealth_income_ratio(networth: &[Option<f64>], income: &[Option<f64>]) -> Vec<Option<f64>> {
    networth
        .iter()
        .zip(income)
        .map(|(nw, inc)| match (nw, inc) {
            (Some(nw), Some(inc)) if *inc != 0.0 => Some(nw / inc),
            _ => None,
        })
        .collect()
}

/// Add `<col>_100k = <col> / 100000` for each rescaled column
pub fn rescale(df: &mut DataFrame) -> Result<()> {
    for (source, target) in RESCALED {
        let values: Vec<Option<f64>> = float_values(df, source)?
            .into_iter()
            .map(|v| v.map(|v| v / RESCALE_DIVISOR))
            .collect();
        df.with_column(Column::new((*target).into(), values))?;
    }
    Ok(())
}

fn derive_age_squared(df: &mut DataFrame) -> Result<()> {
    let age_sq: Vec<Option<f64>> = float_values(df, "age")?
        .into_iter()
        .map(|a| a.map(|a| a * a))
        .collect();
    df.with_column(Column::new("age_sq".into(), age_sq))?;
    Ok(())
}

/// Apply every derivation to the merged table (all implicates).
pub fn transform(mut df: DataFrame, config: &AnalysisConfig) -> Result<Transformed> {
    let w = &config.winsorize;
    let mut winsor = WinsorReport::new(w.lower, w.upper);

    derive_literacy(&mut df, config)?;
    derive_dummies(&mut df)?;
    derive_age_squared(&mut df)?;

    winsorize_columns(&mut df, &w.columns, IMPLICATE_COLUMN, w.lower, w.upper, &mut winsor)
        .context("Failed to winsorize wealth columns")?;

    let ratio = wealth_income_ratio(
        &float_values(&df, "networth")?,
        &float_values(&df, "income")?,
    );
    let undefined = ratio.iter().filter(|r| r.is_none()).count();
    if undefined > 0 {
        log::warn!(
            "{} row(s) have zero or missing income; wealth/income ratio left missing",
            undefined
        );
    }
    df.with_column(Column::new(RATIO_COLUMN.into(), ratio))?;

    winsorize_columns(
        &mut df,
        &[RATIO_COLUMN.to_string()],
        IMPLICATE_COLUMN,
        w.lower,
        w.upper,
        &mut winsor,
    )
    .context("Failed to winsorize wealth/income ratio")?;

    rescale(&mut df)?;

    log::info!(
        "Transformed {} rows; {} value(s) clipped across {} column(s)",
        df.height(),
        winsor.total_clipped(),
        winsor.columns.len()
    );

    Ok(Transformed { frame: df, winsor })
}

/// Keep the rows of a single implicate.
///
/// The main analysis uses implicate 1 only rather than pooling all five;
/// the published estimates depend on this choice.
pub fn analysis_sample(frame: &DataFrame, implicate: i64) -> Result<DataFrame> {
    let sample = frame
        .clone()
        .lazy()
        .filter(col(IMPLICATE_COLUMN).eq(lit(implicate)))
        .collect()?;

    if sample.height() == 0 {
        return Err(PipelineError::EmptyImplicate { implicate }.into());
    }
    Ok(sample)
}
