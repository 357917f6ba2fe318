//! Stata `.dta` file reader.
//!
//! The Survey of Consumer Finances ships its public tables as Stata files.
//! This module reads them straight into Polars DataFrames so no conversion
//! step is needed before a run.
//!
//! # Module Structure
//!
//! - `error` - Error types for parsing failures
//! - `header` - Release detection, header and variable descriptors
//! - `data` - Missing-value aware decoding of the data section

pub mod data;
pub mod error;
pub mod header;

pub use error::DtaError;

use std::path::Path;

use polars::prelude::*;

use self::data::read_columns;
use self::header::parse_header;

/// Load a `.dta` file into a DataFrame.
///
/// # Errors
/// * `DtaError::UnsupportedRelease` - Not release 114, 115, 117, 118 or 119
/// * `DtaError::MalformedTag` - Corrupt tagged layout
/// * `DtaError::TruncatedData` - File shorter than its header claims
pub fn load_dta(path: &Path) -> Result<DataFrame, DtaError> {
    let buf = std::fs::read(path)?;
    read_dta(&buf)
}

/// Parse an in-memory `.dta` image.
pub fn read_dta(buf: &[u8]) -> Result<DataFrame, DtaError> {
    let header = parse_header(buf)?;
    log::debug!(
        "Stata release {} ({:?}), {} variables, {} observations, label '{}'",
        header.release,
        header.byte_order,
        header.variables.len(),
        header.nobs,
        header.data_label
    );
    let columns = read_columns(buf, &header)?;
    Ok(DataFrame::new(columns)?)
}
