//! Regression table layout and rendering
//!
//! A [`RegressionTable`] is built once from the fitted models and rendered
//! either as an aligned plain-text table or as a LaTeX `tabular`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use comfy_table::{presets::ASCII_HORIZONTAL_ONLY, Cell, CellAlignment, Table};
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::pipeline::{FitOutcome, LiteracySpec, QuantileFit};

/// Output format of the written tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    Text,
    Latex,
}

impl TableFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Text => "txt",
            TableFormat::Latex => "tex",
        }
    }
}

impl FromStr for TableFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(TableFormat::Text),
            "latex" | "tex" => Ok(TableFormat::Latex),
            _ => Err(format!(
                "Invalid table format: '{}'. Valid options: text, latex",
                s
            )),
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableFormat::Text => write!(f, "text"),
            TableFormat::Latex => write!(f, "latex"),
        }
    }
}

/// Stars for a p-value given the one/two/three-star cutoffs
pub fn significance_stars(p: f64, thresholds: &[f64; 3]) -> &'static str {
    if p.is_nan() {
        ""
    } else if p < thresholds[2] {
        "***"
    } else if p < thresholds[1] {
        "**"
    } else if p < thresholds[0] {
        "*"
    } else {
        ""
    }
}

/// A coefficient line and the standard-error line beneath it
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    pub label: String,
    pub estimates: Vec<String>,
    pub std_errors: Vec<String>,
}

/// Footer line (observations, pseudo R-squared)
#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    pub label: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<CoefficientRow>,
    pub stats: Vec<StatRow>,
    pub notes: Vec<String>,
}

impl RegressionTable {
    pub fn render(&self, format: TableFormat) -> String {
        match format {
            TableFormat::Text => self.render_text(),
            TableFormat::Latex => self.render_latex(),
        }
    }

    fn render_text(&self) -> String {
        let mut table = Table::new();
        table.load_preset(ASCII_HORIZONTAL_ONLY);
        table.force_no_tty();

        let mut header = vec![Cell::new("")];
        header.extend(
            self.columns
                .iter()
                .map(|c| Cell::new(c).set_alignment(CellAlignment::Right)),
        );
        table.set_header(header);

        let right = |s: &String| Cell::new(s).set_alignment(CellAlignment::Right);
        for row in &self.rows {
            let mut line = vec![Cell::new(&row.label)];
            line.extend(row.estimates.iter().map(right));
            table.add_row(line);

            let mut se_line = vec![Cell::new("")];
            se_line.extend(row.std_errors.iter().map(right));
            table.add_row(se_line);
        }
        for stat in &self.stats {
            let mut line = vec![Cell::new(&stat.label)];
            line.extend(stat.values.iter().map(right));
            table.add_row(line);
        }

        let mut out = format!("{}\n\n{}\n", self.title, table);
        for note in &self.notes {
            out.push_str(note);
            out.push('\n');
        }
        out
    }

    fn render_latex(&self) -> String {
        let mut out = String::new();
        out.push_str("\\providecommand{\\sym}[1]{\\ifmmode^{#1}\\else\\(^{#1}\\)\\fi}\n");
        out.push_str("\\begin{table}[htbp]\\centering\n");
        out.push_str(&format!("\\caption{{{}}}\n", latex_escape(&self.title)));
        out.push_str(&format!(
            "\\begin{{tabular}}{{l{}}}\n",
            "c".repeat(self.columns.len())
        ));
        out.push_str("\\hline\\hline\n");

        let header: Vec<String> = self.columns.iter().map(|c| latex_escape(c)).collect();
        out.push_str(&format!(" & {} \\\\\n", header.join(" & ")));
        out.push_str("\\hline\n");

        for row in &self.rows {
            let estimates: Vec<String> = row.estimates.iter().map(|e| latex_stars(e)).collect();
            out.push_str(&format!(
                "{} & {} \\\\\n",
                latex_escape(&row.label),
                estimates.join(" & ")
            ));
            out.push_str(&format!(" & {} \\\\\n", row.std_errors.join(" & ")));
        }

        if !self.stats.is_empty() {
            out.push_str("\\hline\n");
            for stat in &self.stats {
                out.push_str(&format!(
                    "{} & {} \\\\\n",
                    latex_escape(&stat.label),
                    stat.values.join(" & ")
                ));
            }
        }

        out.push_str("\\hline\\hline\n");
        for note in &self.notes {
            out.push_str(&format!(
                "\\multicolumn{{{}}}{{l}}{{\\footnotesize {}}} \\\\\n",
                self.columns.len() + 1,
                latex_escape(note)
            ));
        }
        out.push_str("\\end{tabular}\n\\end{table}\n");
        out
    }
}

fn latex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(ch);
            }
            '<' => out.push_str("$<$"),
            '>' => out.push_str("$>$"),
            _ => out.push(ch),
        }
    }
    out
}

/// `0.123**` -> `0.123\sym{**}`
fn latex_stars(cell: &str) -> String {
    let stars = cell.chars().rev().take_while(|c| *c == '*').count();
    if stars == 0 {
        return cell.to_string();
    }
    let (value, marks) = cell.split_at(cell.len() - stars);
    format!("{}\\sym{{{}}}", value, marks)
}

fn format_estimate(fit: &QuantileFit, name: &str, config: &AnalysisConfig) -> (String, String) {
    let precision = config.report.precision;
    match fit.coefficient(name) {
        Some(c) => (
            format!(
                "{:.*}{}",
                precision,
                c.estimate,
                c.p_value
                    .map_or("", |p| significance_stars(p, &config.report.star_thresholds))
            ),
            format!("({:.*})", precision, c.std_error),
        ),
        None => (String::new(), String::new()),
    }
}

fn standard_notes(config: &AnalysisConfig) -> Vec<String> {
    let [one, two, three] = config.report.star_thresholds;
    vec![
        format!(
            "Weighted quantile regressions (tau = {:.2}); standard errors in parentheses.",
            config.model.quantile
        ),
        format!(
            "* p<{} ** p<{} *** p<{}",
            trim_float(one),
            trim_float(two),
            trim_float(three)
        ),
    ]
}

fn trim_float(v: f64) -> String {
    let s = format!("{}", v);
    if s.starts_with("0.") {
        s[1..].to_string()
    } else {
        s
    }
}

fn failure_notes(outcomes: &[&FitOutcome], config: &AnalysisConfig) -> Vec<String> {
    outcomes
        .iter()
        .filter_map(|o| {
            o.result.as_ref().err().map(|e| {
                format!(
                    "n/a: {} on {} could not be estimated ({})",
                    o.spec.outcome,
                    o.spec.literacy.column(config),
                    e
                )
            })
        })
        .collect()
}

/// One table per literacy specification: outcomes across, the literacy
/// coefficient and the keep-list down.
pub fn panel_table(
    outcomes: &[FitOutcome],
    literacy: LiteracySpec,
    config: &AnalysisConfig,
) -> RegressionTable {
    let report = &config.report;
    let panel: Vec<&FitOutcome> = outcomes
        .iter()
        .filter(|o| o.spec.literacy == literacy)
        .collect();

    let literacy_column = literacy.column(config);
    let mut names = vec![literacy_column.to_string()];
    names.extend(
        report
            .keep
            .iter()
            .filter(|k| k.as_str() != literacy_column)
            .cloned(),
    );

    let rows = names
        .iter()
        .map(|name| {
            let (estimates, std_errors): (Vec<String>, Vec<String>) = panel
                .iter()
                .map(|o| match o.fit() {
                    Some(fit) => format_estimate(fit, name, config),
                    None => ("n/a".to_string(), String::new()),
                })
                .unzip();
            CoefficientRow {
                label: report.label(name).to_string(),
                estimates,
                std_errors,
            }
        })
        .collect();

    let stats = vec![
        StatRow {
            label: "Observations".to_string(),
            values: panel
                .iter()
                .map(|o| o.fit().map(|f| f.observations.to_string()).unwrap_or_default())
                .collect(),
        },
        StatRow {
            label: "Pseudo R-squared".to_string(),
            values: panel
                .iter()
                .map(|o| {
                    o.fit()
                        .map(|f| format!("{:.*}", report.precision, f.pseudo_r2))
                        .unwrap_or_default()
                })
                .collect(),
        },
    ];

    let mut notes = standard_notes(config);
    notes.extend(failure_notes(&panel, config));

    RegressionTable {
        title: format!("{}: {}", literacy.title(), report.label(literacy_column)),
        columns: panel
            .iter()
            .map(|o| report.label(&o.spec.outcome).to_string())
            .collect(),
        rows,
        stats,
        notes,
    }
}

/// Literacy coefficient of every model: one row per specification
pub fn summary_table(outcomes: &[FitOutcome], config: &AnalysisConfig) -> RegressionTable {
    literacy_grid(
        outcomes,
        config,
        "Financial literacy and household wealth: median regressions".to_string(),
    )
}

/// Same layout as [`summary_table`] for fits pooled over implicates
pub fn pooled_table(pooled: &[FitOutcome], config: &AnalysisConfig) -> RegressionTable {
    let mut table = literacy_grid(
        pooled,
        config,
        "Financial literacy and household wealth: pooled over implicates".to_string(),
    );
    table
        .notes
        .insert(1, "Standard errors combine all implicates with Rubin's rules.".to_string());
    table
}

fn literacy_grid(
    outcomes: &[FitOutcome],
    config: &AnalysisConfig,
    title: String,
) -> RegressionTable {
    let report = &config.report;
    let columns: Vec<String> = config.model.outcomes.clone();

    let rows = LiteracySpec::ALL
        .iter()
        .map(|literacy| {
            let name = literacy.column(config);
            let (estimates, std_errors): (Vec<String>, Vec<String>) = columns
                .iter()
                .map(|outcome| {
                    let found = outcomes
                        .iter()
                        .find(|o| o.spec.literacy == *literacy && &o.spec.outcome == outcome);
                    match found.and_then(|o| o.fit()) {
                        Some(fit) => format_estimate(fit, name, config),
                        None => ("n/a".to_string(), String::new()),
                    }
                })
                .unzip();
            CoefficientRow {
                label: report.label(name).to_string(),
                estimates,
                std_errors,
            }
        })
        .collect();

    let all: Vec<&FitOutcome> = outcomes.iter().collect();
    let mut notes = standard_notes(config);
    notes.push("Each cell is a separate regression including the full control set.".to_string());
    notes.extend(failure_notes(&all, config));

    RegressionTable {
        title,
        columns: columns.iter().map(|c| report.label(c).to_string()).collect(),
        rows,
        stats: Vec::new(),
        notes,
    }
}

/// Tables of a run keyed by file stem, in write order
pub fn build_tables(
    outcomes: &[FitOutcome],
    pooled: Option<&[FitOutcome]>,
    config: &AnalysisConfig,
) -> Vec<(String, RegressionTable)> {
    let mut tables: Vec<(String, RegressionTable)> = LiteracySpec::ALL
        .iter()
        .map(|literacy| {
            (
                format!("panel_{}", literacy.column(config)),
                panel_table(outcomes, *literacy, config),
            )
        })
        .collect();
    tables.push(("summary".to_string(), summary_table(outcomes, config)));
    if let Some(pooled) = pooled {
        tables.push(("summary_pooled".to_string(), pooled_table(pooled, config)));
    }
    tables
}

/// Path a table with `stem` is written to
pub fn table_path(output_dir: &Path, stem: &str, format: TableFormat) -> PathBuf {
    output_dir.join(format!("{}.{}", stem, format.extension()))
}

/// Render and write every table, creating the output directory if needed
pub fn write_tables(
    tables: &[(String, RegressionTable)],
    output_dir: &Path,
    format: TableFormat,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    tables
        .iter()
        .map(|(stem, table)| {
            let path = table_path(output_dir, stem, format);
            std::fs::write(&path, table.render(format))
                .with_context(|| format!("Failed to write table to {}", path.display()))?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::qreg::{Coefficient, StdErrorMethod};
    use crate::pipeline::EstimationError;

    fn fit(outcome: &str, literacy: &str, estimate: f64, se: f64) -> QuantileFit {
        QuantileFit {
            outcome: outcome.to_string(),
            quantile: 0.5,
            observations: 5777,
            sum_weights: 1.0,
            coefficients: vec![
                Coefficient::new(literacy.to_string(), estimate, se),
                Coefficient::new("female".to_string(), -0.25, 0.1),
                Coefficient::new("_cons".to_string(), 1.0, 0.5),
            ],
            pseudo_r2: 0.1234,
            objective: 1.0,
            bandwidth: 0.1,
            std_error_method: StdErrorMethod::Kernel,
            solve_time_ms: 1,
        }
    }

    fn outcomes(config: &AnalysisConfig) -> Vec<FitOutcome> {
        crate::pipeline::model_grid(config)
            .into_iter()
            .map(|spec| {
                let failing =
                    spec.outcome == "nfin_100k" && spec.literacy == LiteracySpec::AllCorrect;
                let result = if failing {
                    Err(EstimationError::SingularDesign {
                        outcome: spec.outcome.clone(),
                    })
                } else {
                    Ok(fit(&spec.outcome, spec.literacy.column(config), 0.5, 0.1))
                };
                FitOutcome { spec, result }
            })
            .collect()
    }

    #[test]
    fn test_significance_stars() {
        let t = [0.10, 0.05, 0.01];
        assert_eq!(significance_stars(0.2, &t), "");
        assert_eq!(significance_stars(0.07, &t), "*");
        assert_eq!(significance_stars(0.05, &t), "*");
        assert_eq!(significance_stars(0.03, &t), "**");
        assert_eq!(significance_stars(0.001, &t), "***");
        assert_eq!(significance_stars(f64::NAN, &t), "");
    }

    #[test]
    fn test_format_round_trip() {
        assert_eq!("tex".parse::<TableFormat>().unwrap(), TableFormat::Latex);
        assert_eq!("TEXT".parse::<TableFormat>().unwrap(), TableFormat::Text);
        assert!("html".parse::<TableFormat>().is_err());
        assert_eq!(TableFormat::Latex.to_string(), "latex");
        assert_eq!(TableFormat::Text.extension(), "txt");
    }

    #[test]
    fn test_panel_layout() {
        let config = AnalysisConfig::default();
        let table = panel_table(&outcomes(&config), LiteracySpec::Score, &config);

        assert_eq!(table.columns.len(), 4);
        assert_eq!(table.columns[0], "Net worth");
        assert_eq!(table.rows.len(), 1 + config.report.keep.len());
        // 0.5 / 0.1 = z of 5
        assert_eq!(table.rows[0].estimates[0], "0.500***");
        assert_eq!(table.rows[0].std_errors[0], "(0.100)");
        // age is kept but absent from this fit
        assert_eq!(table.rows[2].estimates[0], "");
        assert_eq!(table.stats[0].values[0], "5777");
        assert_eq!(table.stats[1].values[0], "0.123");
    }

    #[test]
    fn test_failed_fit_shows_na() {
        let config = AnalysisConfig::default();
        let table = panel_table(&outcomes(&config), LiteracySpec::AllCorrect, &config);
        assert_eq!(table.rows[0].estimates[2], "n/a");
        assert!(table.notes.iter().any(|n| n.contains("nfin_100k on finlit_3c")));

        let summary = summary_table(&outcomes(&config), &config);
        assert_eq!(summary.rows.len(), 2);
        assert_eq!(summary.rows[1].estimates[2], "n/a");
        assert_eq!(summary.rows[0].estimates[2], "0.500***");
    }

    #[test]
    fn test_render_latex() {
        let config = AnalysisConfig::default();
        let table = panel_table(&outcomes(&config), LiteracySpec::Score, &config);
        let tex = table.render(TableFormat::Latex);
        assert!(tex.contains("\\begin{tabular}{lcccc}"));
        assert!(tex.contains("0.500\\sym{***}"));
        assert!(tex.contains("Income (\\$100k)"));
        assert!(tex.ends_with("\\end{table}\n"));
    }

    #[test]
    fn test_render_text() {
        let config = AnalysisConfig::default();
        let table = summary_table(&outcomes(&config), &config);
        let text = table.render(TableFormat::Text);
        assert!(text.starts_with("Financial literacy and household wealth"));
        assert!(text.contains("Financial literacy (0-3)"));
        assert!(text.contains("(0.100)"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn test_build_and_write_tables() {
        let config = AnalysisConfig::default();
        let outcomes = outcomes(&config);
        let tables = build_tables(&outcomes, None, &config);
        let stems: Vec<&str> = tables.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(stems, vec!["panel_finlit", "panel_finlit_3c", "summary"]);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tables");
        let paths = write_tables(&tables, &out, TableFormat::Text).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(out.join("panel_finlit_3c.txt").exists());
    }
}
