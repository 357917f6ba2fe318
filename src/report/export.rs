//! Machine-readable results and output bundling

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::pipeline::{FitOutcome, LiteracySpec, QuantileFit, SourcePaths, WinsorReport};

/// Input files of a run
#[derive(Debug, Clone, Serialize)]
pub struct InputFiles {
    pub main: String,
    pub summary: String,
    pub weights: String,
}

impl From<&SourcePaths> for InputFiles {
    fn from(paths: &SourcePaths) -> Self {
        Self {
            main: paths.main.display().to_string(),
            summary: paths.summary.display().to_string(),
            weights: paths.weights.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FitStatus {
    Ok,
    Failed,
}

/// One model of the grid, fitted or not
#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub outcome: String,
    pub literacy: LiteracySpec,
    pub literacy_column: String,
    pub status: FitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<QuantileFit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelEntry {
    fn from_outcome(outcome: &FitOutcome, config: &AnalysisConfig) -> Self {
        let (status, fit, error) = match &outcome.result {
            Ok(fit) => (FitStatus::Ok, Some(fit.clone()), None),
            Err(e) => (FitStatus::Failed, None, Some(e.to_string())),
        };
        Self {
            outcome: outcome.spec.outcome.clone(),
            literacy: outcome.spec.literacy,
            literacy_column: outcome.spec.literacy.column(config).to_string(),
            status,
            fit,
            error,
        }
    }
}

/// Analysis sample description
#[derive(Debug, Clone, Serialize)]
pub struct SampleEntry {
    pub merged_rows: usize,
    pub implicate: i64,
    pub analysis_rows: usize,
    pub pooled_implicates: bool,
}

/// Full `results.json` document
#[derive(Debug, Clone, Serialize)]
pub struct ResultsDocument {
    pub generated_at: String,
    pub version: String,
    pub inputs: InputFiles,
    pub parameters: AnalysisConfig,
    pub sample: SampleEntry,
    pub winsorization: WinsorReport,
    pub models: Vec<ModelEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pooled: Option<Vec<ModelEntry>>,
}

/// Parameters for building a [`ResultsDocument`]
pub struct ResultsParams<'a> {
    pub paths: &'a SourcePaths,
    pub config: &'a AnalysisConfig,
    pub sample: SampleEntry,
    pub winsor: &'a WinsorReport,
    pub outcomes: &'a [FitOutcome],
    pub pooled: Option<&'a [FitOutcome]>,
}

impl ResultsDocument {
    pub fn new(params: ResultsParams<'_>) -> Self {
        let entries = |outcomes: &[FitOutcome]| -> Vec<ModelEntry> {
            outcomes
                .iter()
                .map(|o| ModelEntry::from_outcome(o, params.config))
                .collect()
        };
        Self {
            generated_at: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            inputs: InputFiles::from(params.paths),
            parameters: params.config.clone(),
            sample: params.sample,
            winsorization: params.winsor.clone(),
            models: entries(params.outcomes),
            pooled: params.pooled.map(entries),
        }
    }
}

/// Export the results document to a JSON file
pub fn export_results_json(document: &ResultsDocument, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(document)
        .context("Failed to serialize results to JSON")?;

    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write results to {}", output_path.display()))?;

    Ok(())
}

/// Zip every file in `paths` into `zip_path`, then remove the loose files.
pub fn package_outputs(paths: &[PathBuf], zip_path: &Path) -> Result<()> {
    use std::io::{Read, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    let zip_file = std::fs::File::create(zip_path)
        .with_context(|| format!("Failed to create zip file: {}", zip_path.display()))?;

    let mut zip = ZipWriter::new(zip_file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for path in paths {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid output file name: {}", path.display()))?;
        zip.start_file(filename, options)
            .with_context(|| format!("Failed to add {} to zip", filename))?;
        let mut content = Vec::new();
        std::fs::File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?
            .read_to_end(&mut content)?;
        zip.write_all(&content)?;
    }

    zip.finish().context("Failed to finalize zip file")?;

    for path in paths {
        std::fs::remove_file(path).ok();
    }

    Ok(())
}
