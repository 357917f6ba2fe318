//! Stata / CSV to Parquet conversion

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use console::style;
use polars::prelude::*;

use crate::pipeline::stata::load_dta;
use crate::utils::create_spinner;

/// Default output path: the input's stem with a `.parquet` extension
pub fn default_output_path(input: &Path) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    parent.join(format!("{}.parquet", stem))
}

/// Convert a `.dta` or `.csv` file to Parquet.
///
/// CSV input is streamed with `sink_parquet`; Stata files are decoded in
/// memory first.
pub fn run_convert(input: &Path, output: Option<&Path>, infer_schema_length: usize) -> Result<()> {
    let output_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input));

    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    println!(
        "\n {} Converting {} to Parquet",
        style("◆").cyan().bold(),
        extension.to_uppercase()
    );
    println!("   Input:  {}", style(input.display()).dim());
    println!("   Output: {}", style(output_path.display()).dim());
    println!();

    let (rows, cols) = match extension.as_str() {
        "dta" => convert_dta(input, &output_path)?,
        "csv" => convert_csv(input, &output_path, infer_schema_length)?,
        _ => bail!(
            "Unsupported input format for conversion: {} ({}). Supported formats: dta, csv",
            extension,
            input.display()
        ),
    };

    let input_size = file_size_mb(input);
    let output_size = file_size_mb(&output_path);

    println!();
    println!(
        "   {} rows × {} columns",
        style(rows).yellow(),
        style(cols).yellow()
    );
    println!("   {} File sizes:", style("✧").cyan());
    println!("      Input:   {:.2} MB", input_size);
    println!("      Parquet: {:.2} MB", output_size);

    if output_size < input_size {
        let reduction = ((input_size - output_size) / input_size) * 100.0;
        println!(
            "      {}",
            style(format!("↓ {:.1}% smaller", reduction)).green()
        );
    }

    println!();
    println!(" {} Conversion complete!", style("✓").green().bold());

    Ok(())
}

fn file_size_mb(path: &Path) -> f64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0) as f64 / (1024.0 * 1024.0)
}

fn convert_dta(input: &Path, output_path: &Path) -> Result<(usize, usize)> {
    let spinner = create_spinner("Decoding Stata file...");
    let mut df = load_dta(input)
        .with_context(|| format!("Failed to read Stata file: {}", input.display()))?;
    spinner.finish_with_message(format!(
        "{} Decoded {} rows",
        style("✓").green(),
        df.height()
    ));

    let spinner = create_spinner("Writing Parquet...");
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Snappy)
        .finish(&mut df)
        .with_context(|| format!("Failed to write Parquet file: {}", output_path.display()))?;
    spinner.finish_with_message(format!("{} Parquet written", style("✓").green()));

    Ok((df.height(), df.width()))
}

fn convert_csv(
    input: &Path,
    output_path: &Path,
    infer_schema_length: usize,
) -> Result<(usize, usize)> {
    // 0 means full scan
    let schema_length = if infer_schema_length == 0 {
        None
    } else {
        Some(infer_schema_length)
    };

    let spinner = create_spinner("Reading CSV schema...");
    let lf = LazyCsvReader::new(input)
        .with_infer_schema_length(schema_length)
        .with_rechunk(false)
        .finish()
        .with_context(|| format!("Failed to read CSV file: {}", input.display()))?;
    let num_cols = lf.clone().collect_schema()?.len();
    spinner.finish_with_message(format!(
        "{} Schema loaded ({} columns)",
        style("✓").green(),
        num_cols
    ));

    let spinner = create_spinner("Streaming to Parquet...");
    let parquet_options = ParquetWriteOptions {
        compression: ParquetCompression::Snappy,
        statistics: StatisticsOptions::full(),
        row_group_size: Some(100_000),
        ..Default::default()
    };
    lf.sink_parquet(&output_path, parquet_options, None)
        .with_context(|| format!("Failed to write Parquet file: {}", output_path.display()))?;
    spinner.finish_with_message(format!("{} Parquet written", style("✓").green()));

    Ok((parquet_row_count(output_path).unwrap_or(0), num_cols))
}

/// Row count from Parquet metadata
fn parquet_row_count(path: &Path) -> Result<usize> {
    let df = LazyFrame::scan_parquet(path, Default::default())?
        .select([len()])
        .collect()?;
    let count = df.column("len")?.get(0)?;
    match count {
        AnyValue::UInt32(n) => Ok(n as usize),
        AnyValue::UInt64(n) => Ok(n as usize),
        AnyValue::Int64(n) => Ok(n as usize),
        _ => Ok(0),
    }
}
