//! Command-line argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AnalysisConfig;
use crate::pipeline::SourcePaths;
use crate::report::TableFormat;

/// Finlit - Weighted median regressions of household wealth on financial literacy
#[derive(Parser, Debug)]
#[command(name = "finlit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Main survey file with the literacy quiz answers (CSV, Parquet, or Stata .dta)
    #[arg(short, long)]
    pub main: Option<PathBuf>,

    /// Summary extract with demographics, wealth, income and the survey weight
    #[arg(short, long)]
    pub summary: Option<PathBuf>,

    /// Household weights file (replicate weights live here)
    #[arg(short, long)]
    pub weights: Option<PathBuf>,

    /// TOML file overriding the default analysis parameters
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory the tables and results.json are written to
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Implicate used for the main analysis (1-5)
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..=5))]
    pub implicate: Option<i64>,

    /// Also fit every implicate and pool them with Rubin's rules
    #[arg(long, default_value = "false")]
    pub pool_implicates: bool,

    /// Number of replicate weights for standard errors (0 = kernel sandwich)
    #[arg(long)]
    pub replicates: Option<usize>,

    /// Table format: "text" or "latex"
    #[arg(long, value_parser = parse_format)]
    pub format: Option<TableFormat>,

    /// Decimal places in the tables
    #[arg(long, value_parser = validate_precision)]
    pub precision: Option<usize>,

    /// Zip all outputs into finlit_results.zip
    #[arg(long, default_value = "false")]
    pub bundle: bool,

    /// Skip interactive confirmation prompts
    #[arg(long, default_value = "false")]
    pub no_confirm: bool,

    /// Number of rows to use for schema inference (CSV only).
    /// Use 0 for full table scan.
    #[arg(long, default_value = "10000")]
    pub infer_schema_length: usize,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a Stata .dta or CSV file to Parquet format
    Convert {
        /// Input file path (.dta or .csv)
        input: PathBuf,

        /// Output file path (optional, defaults to input with .parquet extension)
        output: Option<PathBuf>,

        /// Number of rows to use for schema inference (CSV only)
        #[arg(long, default_value = "10000")]
        infer_schema_length: usize,
    },
}

impl Cli {
    /// The three input paths, or the flags that are missing
    pub fn source_paths(&self) -> Result<SourcePaths, String> {
        let missing: Vec<&str> = [
            ("--main", &self.main),
            ("--summary", &self.summary),
            ("--weights", &self.weights),
        ]
        .iter()
        .filter(|(_, p)| p.is_none())
        .map(|(flag, _)| *flag)
        .collect();

        match (&self.main, &self.summary, &self.weights) {
            (Some(main), Some(summary), Some(weights)) => Ok(SourcePaths {
                main: main.clone(),
                summary: summary.clone(),
                weights: weights.clone(),
            }),
            _ => Err(format!("Missing required input(s): {}", missing.join(", "))),
        }
    }

    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut AnalysisConfig) {
        if let Some(implicate) = self.implicate {
            config.model.implicate = implicate;
        }
        if let Some(replicates) = self.replicates {
            config.model.replicates = replicates;
        }
        if let Some(format) = self.format {
            config.report.format = format;
        }
        if let Some(precision) = self.precision {
            config.report.precision = precision;
        }
    }
}

fn parse_format(s: &str) -> Result<TableFormat, String> {
    s.parse()
}

/// Validator for the precision parameter
fn validate_precision(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;

    if value > 10 {
        Err(format!("precision must be between 0 and 10, got {}", value))
    } else {
        Ok(value)
    }
}
