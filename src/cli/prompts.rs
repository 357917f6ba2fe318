//! Interactive prompts using dialoguer

use std::path::PathBuf;

use anyhow::Result;
use dialoguer::Confirm;

/// Prompt user to confirm proceeding with an action
pub fn confirm_step(message: &str) -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt(message)
        .default(true)
        .interact()?;
    Ok(confirmed)
}

/// Files among `paths` that a run would overwrite
pub fn existing_outputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths.iter().filter(|p| p.exists()).cloned().collect()
}

/// Prompt user to confirm overwriting existing output files
pub fn confirm_overwrite(existing: &[PathBuf]) -> Result<bool> {
    let names: Vec<String> = existing
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    let message = format!(
        "Overwrite {} existing file(s) ({})?",
        existing.len(),
        names.join(", ")
    );
    confirm_step(&message)
}
