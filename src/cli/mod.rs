//! CLI module - argument parsing, prompts and file conversion

mod args;
pub mod convert;
mod prompts;

pub use args::{Cli, Commands};
pub use convert::run_convert;
pub use prompts::*;
