//! Finlit: Financial Literacy and Wealth CLI Tool
//!
//! Joins the SCF 2019 survey extracts, winsorizes and derives the analysis
//! variables, and writes weighted median regression tables.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;

use finlit::cli::{self, confirm_overwrite, existing_outputs, Cli, Commands};
use finlit::config::AnalysisConfig;
use finlit::pipeline::{
    analysis_sample, estimate_models, estimate_pooled, load_sources, transform,
};
use finlit::report::{
    build_tables, export_results_json, package_outputs, table_path, write_tables,
    ResultsDocument, ResultsParams, RunSummary, SampleEntry,
};
use finlit::utils::{
    create_spinner, finish_with_success, finish_with_warning, print_banner, print_completion,
    print_config, print_count, print_info, print_step_header, print_step_time, print_success,
};

const RESULTS_FILE: &str = "results.json";
const BUNDLE_FILE: &str = "finlit_results.zip";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    // Handle subcommands
    if let Some(command) = &cli.command {
        return match command {
            Commands::Convert {
                input,
                output,
                infer_schema_length,
            } => cli::run_convert(input, output.as_deref(), *infer_schema_length),
        };
    }

    let paths = cli.source_paths().map_err(|e| {
        anyhow::anyhow!("{}. Use -m/--main, -s/--summary and -w/--weights.", e)
    })?;

    let mut config = AnalysisConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid analysis parameters")?;

    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(&paths, &cli.output_dir, &config);

    // Refuse to clobber earlier results without asking
    let planned = planned_outputs(&cli, &config);
    let existing = existing_outputs(&planned);
    if !existing.is_empty() && !cli.no_confirm && !confirm_overwrite(&existing)? {
        println!("Cancelled by user.");
        return Ok(());
    }

    let mut summary = RunSummary::new();
    summary.implicate = config.model.implicate;

    // Step 1: Load and join
    print_step_header(1, "Load Survey Files");
    let step_start = Instant::now();
    let spinner = create_spinner("Reading main, summary and weights files...");
    let merged = load_sources(&paths, &config, cli.infer_schema_length)?;
    finish_with_success(&spinner, "Survey files joined");

    summary.main_rows = merged.main_rows;
    summary.summary_rows = merged.summary_rows;
    summary.weights_rows = merged.weights_rows;
    summary.merged_rows = merged.frame.height();
    print_count(
        "rows after joining",
        merged.frame.height(),
        Some(&format!("({} columns)", merged.frame.width())),
    );
    if merged.frame.height() < merged.main_rows {
        print_count(
            "main-file row(s) without a matching record",
            merged.main_rows - merged.frame.height(),
            None,
        );
    }
    let elapsed = step_start.elapsed();
    summary.record_step("Load", elapsed);
    print_step_time(elapsed);

    // Step 2: Derive and winsorize
    print_step_header(2, "Derive Variables");
    let step_start = Instant::now();
    let spinner = create_spinner("Winsorizing and deriving columns...");
    let transformed = transform(merged.frame, &config)?;
    finish_with_success(&spinner, "Analysis variables derived");

    summary.clipped_values = transformed.winsor.total_clipped();
    print_count(
        "value(s) clipped",
        transformed.winsor.total_clipped(),
        Some(&format!(
            "(p{} / p{} within each implicate)",
            config.winsorize.lower, config.winsorize.upper
        )),
    );
    let elapsed = step_start.elapsed();
    summary.record_step("Transform", elapsed);
    print_step_time(elapsed);

    // Step 3: Analysis sample
    print_step_header(3, "Select Analysis Sample");
    let step_start = Instant::now();
    let sample = analysis_sample(&transformed.frame, config.model.implicate)
        .with_context(|| format!("Failed to select implicate {}", config.model.implicate))?;
    summary.analysis_rows = sample.height();
    print_count(
        "households in the analysis sample",
        sample.height(),
        Some(&format!("(implicate {})", config.model.implicate)),
    );
    let elapsed = step_start.elapsed();
    summary.record_step("Sample", elapsed);
    print_step_time(elapsed);

    // Step 4: Estimate
    print_step_header(4, "Quantile Regressions");
    let step_start = Instant::now();
    if config.model.replicates > 0 {
        print_info(&format!(
            "Standard errors from {} replicate weights",
            config.model.replicates
        ));
    } else {
        print_info("Standard errors from the kernel sandwich estimator");
    }
    let outcomes = estimate_models(&sample, &config);
    summary.record_fits(&outcomes);

    let pooled = if cli.pool_implicates {
        print_info("Pooling all implicates with Rubin's rules");
        Some(estimate_pooled(&transformed.frame, &config)?)
    } else {
        None
    };

    if summary.fits_failed.is_empty() {
        print_success(&format!("{} models fitted", summary.fits_succeeded));
    } else {
        print_count(
            "model(s) failed",
            summary.fits_failed.len(),
            Some("(reported as n/a)"),
        );
    }
    let elapsed = step_start.elapsed();
    summary.record_step("Estimate", elapsed);
    print_step_time(elapsed);

    // Step 5: Report
    print_step_header(5, "Write Tables");
    let step_start = Instant::now();
    let spinner = create_spinner("Rendering regression tables...");
    let tables = build_tables(&outcomes, pooled.as_deref(), &config);
    let mut written = write_tables(&tables, &cli.output_dir, config.report.format)?;

    let results_path = cli.output_dir.join(RESULTS_FILE);
    let document = ResultsDocument::new(ResultsParams {
        paths: &paths,
        config: &config,
        sample: SampleEntry {
            merged_rows: summary.merged_rows,
            implicate: config.model.implicate,
            analysis_rows: summary.analysis_rows,
            pooled_implicates: pooled.is_some(),
        },
        winsor: &transformed.winsor,
        outcomes: &outcomes,
        pooled: pooled.as_deref(),
    });
    export_results_json(&document, &results_path)?;
    written.push(results_path);

    if cli.bundle {
        let zip_path = cli.output_dir.join(BUNDLE_FILE);
        package_outputs(&written, &zip_path)?;
        written = vec![zip_path];
    }

    if summary.fits_failed.is_empty() {
        finish_with_success(&spinner, &format!("{} file(s) written", written.len()));
    } else {
        finish_with_warning(
            &spinner,
            &format!("{} file(s) written with failed models", written.len()),
        );
    }
    summary.outputs = written;
    let elapsed = step_start.elapsed();
    summary.record_step("Report", elapsed);
    print_step_time(elapsed);

    summary.display();
    print_completion();

    if !summary.fits_failed.is_empty() {
        println!(
            "    {} {}",
            style("!").yellow().bold(),
            style("Some models failed; see results.json for the errors").yellow()
        );
    }

    Ok(())
}

/// Files a run with these settings will write
fn planned_outputs(cli: &Cli, config: &AnalysisConfig) -> Vec<PathBuf> {
    let format = config.report.format;
    let mut stems = vec![
        format!("panel_{}", config.literacy.score_column),
        format!("panel_{}", config.literacy.all_correct_column),
        "summary".to_string(),
    ];
    if cli.pool_implicates {
        stems.push("summary_pooled".to_string());
    }

    let mut paths: Vec<PathBuf> = stems
        .iter()
        .map(|stem| table_path(&cli.output_dir, stem, format))
        .collect();
    paths.push(cli.output_dir.join(RESULTS_FILE));
    if cli.bundle {
        paths.push(cli.output_dir.join(BUNDLE_FILE));
    }
    paths
}
