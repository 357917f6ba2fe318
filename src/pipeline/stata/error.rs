//! Error types for Stata `.dta` parsing.

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors that can occur when reading a Stata `.dta` file.
#[derive(Error, Debug)]
pub enum DtaError {
    /// Underlying I/O failure while reading the file.
    #[error("I/O error reading Stata file: {0}")]
    Io(#[from] std::io::Error),

    /// The release byte (or `<release>` tag) names a format this reader does not handle.
    #[error("Unsupported Stata release {0} (supported: 114, 115, 117, 118, 119)")]
    UnsupportedRelease(u16),

    /// A structural tag of the 117+ layout was not where the format requires it.
    #[error("Malformed Stata file: expected '{expected}' at byte offset {offset}")]
    MalformedTag { expected: String, offset: usize },

    /// The byte order marker is neither LSF/MSF nor 1/2.
    #[error("Invalid byte order marker: {0}")]
    InvalidByteOrder(String),

    /// A variable type code is outside the documented set.
    #[error("Unknown type code {code} for variable {index}")]
    UnknownVariableType { code: u16, index: usize },

    /// The file ends before the header or data section does.
    #[error("Stata file truncated: needed {needed} byte(s) at offset {offset}, file has {len}")]
    TruncatedData {
        offset: usize,
        needed: usize,
        len: usize,
    },

    /// Assembling the DataFrame failed.
    #[error(transparent)]
    Polars(#[from] PolarsError),
}
