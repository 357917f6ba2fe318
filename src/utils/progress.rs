//! Spinners and model-fitting bars using indicatif

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(100);

/// Spinner for a pipeline step of unknown length
pub fn create_spinner(message: &str) -> ProgressBar {
    let style = ProgressStyle::default_spinner()
        .template("    {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let pb = ProgressBar::new_spinner().with_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(TICK);
    pb
}

/// Bar over the (outcome, literacy) pairs of a model grid
pub fn create_fit_bar(models: usize, message: &str) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("    {msg:<32} [{bar:30.cyan/blue}] {pos}/{len} models ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    let pb = ProgressBar::new(models as u64).with_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Close a grid bar, flagging it when some pairs failed
pub fn finish_fit_bar(pb: &ProgressBar, fitted: usize, total: usize) {
    let message = format!("Fitted {} of {} models", fitted, total);
    if fitted == total {
        finish_with_success(pb, &message);
    } else {
        finish_with_warning(pb, &message);
    }
}

pub fn finish_with_success(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("✅ {}", message));
}

pub fn finish_with_warning(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("⚠️  {}", message));
}
