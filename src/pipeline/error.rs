//! Contract violations raised while loading and transforming the survey tables

use thiserror::Error;

/// Fatal pipeline errors. Each variant names the input file (or stage) and
/// the offending column so the run can be fixed without a debugger.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Column '{column}' not found in {file} file after lower-casing names")]
    MissingColumn { file: String, column: String },

    #[error("Join key '{key}' has {duplicates} duplicate value(s) in {file} file")]
    DuplicateKey {
        file: String,
        key: String,
        duplicates: usize,
    },

    #[error("Column names collide after lower-casing in {file} file: '{column}'")]
    NameCollision { file: String, column: String },

    #[error("Implicate {value} for person id {person_id} is outside 1..=5")]
    ImplicateOutOfRange { person_id: i64, value: i64 },

    #[error("Literacy score {value} in column '{column}' is outside 0..=3")]
    ScoreOutOfRange { column: String, value: i64 },

    #[error("No rows remain for implicate {implicate}")]
    EmptyImplicate { implicate: i64 },
}
