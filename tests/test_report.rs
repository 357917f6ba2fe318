//! Integration tests for table writing, JSON export and bundling

use std::io::Read;

use finlit::config::AnalysisConfig;
use finlit::pipeline::*;
use finlit::report::*;

#[path = "common/mod.rs"]
mod common;

use common::*;

struct RunOutput {
    fixture: ScfFixture,
    config: AnalysisConfig,
    transformed: Transformed,
    outcomes: Vec<FitOutcome>,
}

fn run_grid(config: AnalysisConfig) -> RunOutput {
    let fixture = create_scf_fixture(150, 0, 31);
    let merged = load_sources(&fixture.paths, &config, 1000).unwrap();
    let transformed = transform(merged.frame, &config).unwrap();
    let sample = analysis_sample(&transformed.frame, config.model.implicate).unwrap();
    let outcomes = estimate_models(&sample, &config);
    RunOutput {
        fixture,
        config,
        transformed,
        outcomes,
    }
}

#[test]
fn test_write_latex_tables() {
    let run = run_grid(AnalysisConfig::default());
    let output_dir = run.fixture.output_dir();

    let tables = build_tables(&run.outcomes, None, &run.config);
    let written = write_tables(&tables, &output_dir, TableFormat::Latex).unwrap();

    let names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["panel_finlit.tex", "panel_finlit_3c.tex", "summary.tex"]);

    let panel = std::fs::read_to_string(output_dir.join("panel_finlit.tex")).unwrap();
    assert!(panel.contains("\\begin{tabular}{lcccc}"));
    assert!(panel.contains("Financial literacy (0-3)"));
    assert!(panel.contains("Observations"));
    assert!(panel.contains("Pseudo R-squared"));
    assert!(panel.contains("\\sym{***}"), "Literacy effect should be significant");
    assert!(!panel.contains("n/a"));
}

#[test]
fn test_write_text_tables_with_failed_model() {
    let mut config = AnalysisConfig::default();
    config.report.format = TableFormat::Text;
    config.model.outcomes.push("missing_outcome".to_string());
    let run = run_grid(config);
    let output_dir = run.fixture.output_dir();

    let tables = build_tables(&run.outcomes, None, &run.config);
    write_tables(&tables, &output_dir, run.config.report.format).unwrap();

    let summary = std::fs::read_to_string(output_dir.join("summary.txt")).unwrap();
    assert!(summary.contains("Net worth"));
    assert!(summary.contains("n/a"));
    assert!(summary.contains("missing_outcome"));
}

#[test]
fn test_results_json_lists_every_model() {
    let run = run_grid(AnalysisConfig::default());
    let output_dir = run.fixture.output_dir();
    std::fs::create_dir_all(&output_dir).unwrap();
    let json_path = output_dir.join("results.json");

    let document = ResultsDocument::new(ResultsParams {
        paths: &run.fixture.paths,
        config: &run.config,
        sample: SampleEntry {
            merged_rows: 750,
            implicate: 1,
            analysis_rows: 150,
            pooled_implicates: false,
        },
        winsor: &run.transformed.winsor,
        outcomes: &run.outcomes,
        pooled: None,
    });
    export_results_json(&document, &json_path).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();

    let models = value["models"].as_array().unwrap();
    assert_eq!(models.len(), 8);
    assert!(models.iter().all(|m| m["status"] == "ok"));
    assert_eq!(models[0]["literacy"], "score");
    assert_eq!(models[0]["fit"]["coefficients"][0]["name"], "finlit");
    assert!(value.get("pooled").is_none());
    assert_eq!(value["sample"]["analysis_rows"], 150);
    assert_eq!(value["parameters"]["model"]["quantile"], 0.5);
    assert!(value["winsorization"]["columns"]["networth"]["1"]["low"].is_number());
}

#[test]
fn test_bundle_replaces_loose_files() {
    let run = run_grid(AnalysisConfig::default());
    let output_dir = run.fixture.output_dir();

    let tables = build_tables(&run.outcomes, None, &run.config);
    let written = write_tables(&tables, &output_dir, TableFormat::Text).unwrap();
    let zip_path = output_dir.join("finlit_results.zip");

    package_outputs(&written, &zip_path).unwrap();

    assert!(zip_path.exists());
    assert!(written.iter().all(|p| !p.exists()));

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&zip_path).unwrap()).unwrap();
    assert_eq!(archive.len(), 3);
    let mut content = String::new();
    archive
        .by_name("summary.txt")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert!(content.contains("Financial literacy (0-3)"));
}
