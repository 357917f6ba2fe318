//! Tests for converting survey extracts to Parquet

use finlit::cli::run_convert;
use finlit::config::AnalysisConfig;
use finlit::pipeline::{load_dataset, load_sources, SourcePaths};
use polars::prelude::*;

#[path = "common/mod.rs"]
mod common;

use common::*;

#[test]
fn test_csv_to_parquet_keeps_nulls_and_types() {
    let dir = tempfile::tempdir().unwrap();
    let mut df = df! {
        "y1" => [11i64, 12, 13],
        "income" => [Some(52_000.0f64), None, Some(61_500.5)],
    }
    .unwrap();
    let csv_path = dir.path().join("summary.csv");
    write_csv(&mut df, &csv_path);
    let parquet_path = dir.path().join("summary.parquet");

    run_convert(&csv_path, Some(&parquet_path), 1000).unwrap();

    let result = load_dataset(&parquet_path, 1000).unwrap();
    assert_eq!(result.shape(), (3, 2));
    assert_eq!(result.column("y1").unwrap().dtype(), &DataType::Int64);
    assert_eq!(result.column("income").unwrap().null_count(), 1);
}

#[test]
fn test_converted_files_feed_the_loader() {
    let fixture = create_scf_fixture(20, 2, 17);
    let convert = |path: &std::path::Path| {
        let out = path.with_extension("parquet");
        run_convert(path, Some(&out), 1000).unwrap();
        out
    };
    let parquet = SourcePaths {
        main: convert(&fixture.paths.main),
        summary: convert(&fixture.paths.summary),
        weights: convert(&fixture.paths.weights),
    };

    let mut config = AnalysisConfig::default();
    config.model.replicates = 2;
    let from_csv = load_sources(&fixture.paths, &config, 1000).unwrap();
    let from_parquet = load_sources(&parquet, &config, 1000).unwrap();

    assert_eq!(from_parquet.frame.shape(), from_csv.frame.shape());
    assert!(from_parquet.frame.equals_missing(&from_csv.frame));
}

#[test]
fn test_default_output_next_to_input() {
    let fixture = create_scf_fixture(5, 0, 2);

    run_convert(&fixture.paths.weights, None, 1000).unwrap();

    assert!(fixture.dir.path().join("p19_rw1.parquet").exists());
}
