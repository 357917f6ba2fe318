//! Analysis parameters
//!
//! Every value has a default reproducing the published study, so a run
//! without `--config` needs no file at all. A TOML file may override any
//! subset of sections.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::report::TableFormat;

/// Top-level analysis configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub sources: SourcesConfig,
    pub winsorize: WinsorizeConfig,
    pub literacy: LiteracyConfig,
    pub model: ModelConfig,
    pub report: ReportConfig,
}

/// Join keys and the columns kept from each input file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Household identifier (shared by all implicates of a household)
    pub household_id: String,
    /// Person identifier (one per household implicate)
    pub person_id: String,
    /// Columns kept from the main survey file, besides the two keys
    pub main_columns: Vec<String>,
    /// Columns kept from the summary extract, besides the person key
    pub summary_columns: Vec<String>,
    /// Columns kept from the weights file, besides the household key
    pub weights_columns: Vec<String>,
    /// Prefix of the replicate weight columns in the weights file
    pub replicate_prefix: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            household_id: "yy1".to_string(),
            person_id: "y1".to_string(),
            main_columns: strings(&["x7558", "x7559", "x7560"]),
            summary_columns: strings(&[
                "hhsex", "racecl4", "edcl", "married", "kids", "occat1", "age", "networth",
                "asset", "fin", "nfin", "income", "wgt",
            ]),
            weights_columns: Vec::new(),
            replicate_prefix: "wt1b".to_string(),
        }
    }
}

/// Outlier clipping parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WinsorizeConfig {
    /// Lower percentile (0-100)
    pub lower: f64,
    /// Upper percentile (0-100)
    pub upper: f64,
    /// Raw columns clipped within each implicate
    pub columns: Vec<String>,
}

impl Default for WinsorizeConfig {
    fn default() -> Self {
        Self {
            lower: 5.0,
            upper: 95.0,
            columns: strings(&["networth", "asset", "fin", "nfin", "income"]),
        }
    }
}

/// One financial-literacy quiz question and the code of its correct answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizItem {
    pub column: String,
    pub correct: i64,
}

/// How the 0-3 literacy score is obtained
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiteracyConfig {
    /// Name of the score column (derived from `items`, or read as-is when
    /// `items` is empty)
    pub score_column: String,
    /// Name of the all-correct indicator
    pub all_correct_column: String,
    /// Quiz items; the score counts matching answers
    pub items: Vec<QuizItem>,
}

impl Default for LiteracyConfig {
    fn default() -> Self {
        Self {
            score_column: "finlit".to_string(),
            all_correct_column: "finlit_3c".to_string(),
            items: vec![
                QuizItem { column: "x7558".to_string(), correct: 1 },
                QuizItem { column: "x7559".to_string(), correct: 5 },
                QuizItem { column: "x7560".to_string(), correct: 5 },
            ],
        }
    }
}

/// Regression grid parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Quantile level (0.5 = median)
    pub quantile: f64,
    /// Survey weight column
    pub weight: String,
    /// Outcome columns, one regression column each
    pub outcomes: Vec<String>,
    /// Control vector shared by every fit
    pub controls: Vec<String>,
    /// Implicate kept for the main analysis
    pub implicate: i64,
    /// Number of replicate weights used for standard errors (0 = kernel sandwich)
    pub replicates: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            quantile: 0.5,
            weight: "wgt".to_string(),
            outcomes: strings(&["networth_100k", "fin_100k", "nfin_100k", "wealth_income_ratio"]),
            controls: strings(&[
                "female",
                "age",
                "age_sq",
                "black",
                "hispanic",
                "other_race",
                "ed_lshs",
                "ed_hs",
                "ed_sc",
                "is_married",
                "kids",
                "self_employed",
                "retired",
                "not_working",
                "income_100k",
            ]),
            implicate: 1,
            replicates: 0,
        }
    }
}

/// Table formatting parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Decimal places for coefficients and standard errors
    pub precision: usize,
    /// p-value cutoffs for one, two and three stars
    pub star_thresholds: [f64; 3],
    /// Control coefficients shown beneath the literacy coefficient
    pub keep: Vec<String>,
    /// Display labels keyed by column name
    pub labels: BTreeMap<String, String>,
    pub format: TableFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        let labels = [
            ("finlit", "Financial literacy (0-3)"),
            ("finlit_3c", "All three correct"),
            ("networth_100k", "Net worth"),
            ("fin_100k", "Financial assets"),
            ("nfin_100k", "Non-financial assets"),
            ("wealth_income_ratio", "Wealth/income"),
            ("female", "Female"),
            ("age", "Age"),
            ("age_sq", "Age squared"),
            ("black", "Black"),
            ("hispanic", "Hispanic"),
            ("other_race", "Other race"),
            ("ed_lshs", "Less than high school"),
            ("ed_hs", "High school"),
            ("ed_sc", "Some college"),
            ("is_married", "Married"),
            ("kids", "Number of kids"),
            ("self_employed", "Self-employed"),
            ("retired", "Retired"),
            ("not_working", "Not working"),
            ("income_100k", "Income ($100k)"),
            ("_cons", "Constant"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            precision: 3,
            star_thresholds: [0.10, 0.05, 0.01],
            keep: strings(&["female", "age", "ed_lshs", "ed_hs", "ed_sc", "is_married", "income_100k"]),
            labels,
            format: TableFormat::Latex,
        }
    }
}

impl ReportConfig {
    /// Display label for a column, falling back to the column name
    pub fn label<'a>(&'a self, column: &'a str) -> &'a str {
        self.labels.get(column).map(String::as_str).unwrap_or(column)
    }
}

impl AnalysisConfig {
    /// Load a TOML file; sections missing from the file keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AnalysisConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    /// Replicate weight column names, `<prefix>1..=replicates`
    pub fn replicate_columns(&self) -> Vec<String> {
        (1..=self.model.replicates)
            .map(|r| format!("{}{}", self.sources.replicate_prefix, r))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.winsorize;
        if !(0.0..=100.0).contains(&w.lower) || !(0.0..=100.0).contains(&w.upper) || w.lower >= w.upper {
            bail!(
                "Winsorization bounds must satisfy 0 <= lower < upper <= 100, got ({}, {})",
                w.lower,
                w.upper
            );
        }

        let tau = self.model.quantile;
        if !(tau > 0.0 && tau < 1.0) {
            bail!("Quantile must lie strictly between 0 and 1, got {}", tau);
        }

        if !(1..=5).contains(&self.model.implicate) {
            bail!("Implicate must be between 1 and 5, got {}", self.model.implicate);
        }

        if self.model.outcomes.is_empty() {
            bail!("At least one outcome column is required");
        }

        let [one, two, three] = self.report.star_thresholds;
        if !(one > two && two > three && three > 0.0 && one < 1.0) {
            bail!(
                "Star thresholds must be strictly decreasing within (0, 1), got {:?}",
                self.report.star_thresholds
            );
        }

        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.outcomes.len(), 4);
        assert_eq!(config.winsorize.lower, 5.0);
        assert_eq!(config.winsorize.upper, 95.0);
        assert_eq!(config.report.precision, 3);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            [model]
            quantile = 0.25
            replicates = 10

            [report]
            format = "text"
            "#,
        )
        .unwrap();

        assert_eq!(config.model.quantile, 0.25);
        assert_eq!(config.model.replicates, 10);
        assert_eq!(config.model.weight, "wgt");
        assert_eq!(config.report.format, TableFormat::Text);
        assert_eq!(config.report.precision, 3);
        assert_eq!(config.winsorize.columns.len(), 5);
    }

    #[test]
    fn test_quiz_items_from_toml() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            [literacy]
            items = [
                { column = "q1", correct = 2 },
                { column = "q2", correct = 1 },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(config.literacy.items.len(), 2);
        assert_eq!(config.literacy.items[0], QuizItem { column: "q1".to_string(), correct: 2 });
        assert_eq!(config.literacy.score_column, "finlit");
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let mut config = AnalysisConfig::default();
        config.winsorize.lower = 95.0;
        config.winsorize.upper = 5.0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Winsorization bounds"));
    }

    #[test]
    fn test_invalid_quantile_rejected() {
        let mut config = AnalysisConfig::default();
        config.model.quantile = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_implicate_rejected() {
        let mut config = AnalysisConfig::default();
        config.model.implicate = 6;
        assert!(config.validate().unwrap_err().to_string().contains("Implicate"));
    }

    #[test]
    fn test_non_decreasing_thresholds_rejected() {
        let mut config = AnalysisConfig::default();
        config.report.star_thresholds = [0.05, 0.10, 0.01];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_replicate_columns() {
        let mut config = AnalysisConfig::default();
        assert!(config.replicate_columns().is_empty());
        config.model.replicates = 3;
        assert_eq!(config.replicate_columns(), vec!["wt1b1", "wt1b2", "wt1b3"]);
    }

    #[test]
    fn test_label_fallback() {
        let report = ReportConfig::default();
        assert_eq!(report.label("female"), "Female");
        assert_eq!(report.label("unlabelled"), "unlabelled");
    }
}
