//! Finlit: Financial Literacy and Wealth Library
//!
//! Loads the SCF 2019 survey extracts, derives the literacy and control
//! variables, and fits weighted median regressions of household wealth
//! on financial literacy.

pub mod cli;
pub mod config;
pub mod pipeline;
pub mod report;
pub mod utils;
