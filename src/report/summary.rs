//! Console summary of a run

use std::path::PathBuf;
use std::time::Duration;

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;

use crate::pipeline::FitOutcome;

/// Counts and timings collected while the pipeline runs
#[derive(Debug, Default)]
pub struct RunSummary {
    pub main_rows: usize,
    pub summary_rows: usize,
    pub weights_rows: usize,
    pub merged_rows: usize,
    pub implicate: i64,
    pub analysis_rows: usize,
    pub clipped_values: usize,
    pub fits_succeeded: usize,
    pub fits_failed: Vec<String>,
    pub step_timings: Vec<(String, Duration)>,
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_step(&mut self, step: &str, elapsed: Duration) {
        self.step_timings.push((step.to_string(), elapsed));
    }

    pub fn record_fits(&mut self, outcomes: &[FitOutcome]) {
        self.fits_succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
        self.fits_failed = outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| format!("{} ~ {:?}", o.spec.outcome, o.spec.literacy))
            .collect();
    }

    pub fn total_time(&self) -> Duration {
        self.step_timings.iter().map(|(_, d)| *d).sum()
    }

    pub fn display(&self) {
        println!();
        println!(
            "    {} {}",
            style("📋").cyan(),
            style("RUN SUMMARY").white().bold()
        );
        println!("    {}", style("─".repeat(50)).dim());
        println!();

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);

        table.add_row(vec![
            Cell::new("📁 Rows (main / summary / weights)"),
            Cell::new(format!(
                "{} / {} / {}",
                self.main_rows, self.summary_rows, self.weights_rows
            )),
        ]);
        table.add_row(vec![
            Cell::new("🔗 Merged rows"),
            Cell::new(self.merged_rows).fg(if self.merged_rows < self.main_rows {
                Color::Yellow
            } else {
                Color::White
            }),
        ]);
        table.add_row(vec![
            Cell::new(format!("🎯 Analysis rows (implicate {})", self.implicate)),
            Cell::new(self.analysis_rows),
        ]);
        table.add_row(vec![
            Cell::new("✂️  Winsorized values"),
            Cell::new(self.clipped_values),
        ]);
        table.add_row(vec![
            Cell::new("✅ Models fitted"),
            Cell::new(self.fits_succeeded)
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
        ]);
        table.add_row(vec![
            Cell::new("⚠️  Models failed"),
            Cell::new(self.fits_failed.len()).fg(if self.fits_failed.is_empty() {
                Color::White
            } else {
                Color::Red
            }),
        ]);
        for (step, elapsed) in &self.step_timings {
            table.add_row(vec![
                Cell::new(format!("⏱️  {}", step)),
                Cell::new(format!("{:.2}s", elapsed.as_secs_f64())),
            ]);
        }
        table.add_row(vec![
            Cell::new("⏱️  Total"),
            Cell::new(format!("{:.2}s", self.total_time().as_secs_f64()))
                .add_attribute(Attribute::Bold),
        ]);

        for line in table.to_string().lines() {
            println!("    {}", line);
        }

        if !self.fits_failed.is_empty() {
            println!();
            println!(
                "      {} {}:",
                style("Failed models").yellow(),
                style(format!("({})", self.fits_failed.len())).dim()
            );
            for model in &self.fits_failed {
                println!("        {} {}", style("•").dim(), model);
            }
        }

        if !self.outputs.is_empty() {
            println!();
            println!(
                "    {} {}",
                style("📝").cyan(),
                style("OUTPUTS").white().bold()
            );
            println!("    {}", style("─".repeat(50)).dim());
            for path in &self.outputs {
                println!("      {} {}", style("•").dim(), path.display());
            }
        }
    }
}
