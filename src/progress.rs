//! Progress indicators for nodeup CLI.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Bar over the steps of a run
pub fn steps_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{pos}/{len}] {bar:30.cyan/blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Spinner for a single long operation
pub fn spinner(msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(msg.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Hidden bar for quiet and JSON output
pub fn hidden() -> ProgressBar {
    ProgressBar::hidden()
}
