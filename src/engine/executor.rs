//! Run display - progress while steps execute and the final summary

use anyhow::Result;
use colored::Colorize;
use converge::{ExecutionRecord, RunResult, StepDescriptor, StepError, StepObserver, StepStatus};
use indicatif::ProgressBar;
use std::time::Duration;

use crate::progress;
use crate::ui;

/// Options for displaying a run
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayOptions {
    /// Print every step, not just failures
    pub verbose: bool,
    /// No progress bar (quiet or JSON output)
    pub hidden: bool,
}

/// StepObserver driving an indicatif bar
pub struct ProgressObserver {
    bar: ProgressBar,
    verbose: bool,
}

impl ProgressObserver {
    pub fn new(total: usize, opts: DisplayOptions) -> Self {
        let bar = if opts.hidden {
            progress::hidden()
        } else {
            progress::steps_bar(total)
        };
        Self {
            bar,
            verbose: opts.verbose,
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl StepObserver for ProgressObserver {
    fn on_step_start(&mut self, _index: usize, _total: usize, step: &StepDescriptor) {
        self.bar.set_message(step.description());
    }

    fn on_retry(&mut self, step: &StepDescriptor, attempt: u32, error: &StepError, delay: Duration) {
        self.bar.println(format!(
            "  {} {} failed (attempt {}), retrying in {}s: {}",
            "⚠".yellow(),
            step.id,
            attempt,
            delay.as_secs(),
            error
        ));
    }

    fn on_step_complete(&mut self, step: &StepDescriptor, record: &ExecutionRecord) {
        self.bar.inc(1);
        let show = self.verbose || matches!(record.status, StepStatus::Failed | StepStatus::Blocked);
        if show {
            let detail = record
                .last_error
                .as_deref()
                .map(|e| format!(" {}", ui::truncate(e, 100).dimmed()))
                .unwrap_or_default();
            self.bar.println(format!(
                "  {} {}{}",
                ui::status_symbol(record.status),
                step.id,
                detail
            ));
        }
    }
}

/// Confirm with user
pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
pub fn print_summary(result: &RunResult) {
    if let Some(error) = &result.error {
        println!();
        println!("  {} Invalid profile: {}", "✗".red().bold(), error);
        return;
    }

    println!();
    for step in &result.steps {
        let note = if step.resumed {
            " (resumed)".dimmed().to_string()
        } else if step.mutated {
            " (changed)".cyan().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {}{}",
            ui::status_symbol(step.status),
            step.step_id,
            note
        );
        if let Some(error) = &step.error {
            println!("      {}", error.dimmed());
        }
    }

    println!();
    if result.is_success() {
        println!("  {} Node provisioned successfully!", "✓".green().bold());
    } else if result.cancelled {
        println!("  {} Run cancelled; rerun with --resume to continue", "⚠".yellow().bold());
    } else {
        println!("  {} Node provisioned with errors", "⚠".yellow().bold());
    }

    let satisfied = result.count(StepStatus::Satisfied);
    let failed = result.count(StepStatus::Failed);
    let blocked = result.count(StepStatus::Blocked);
    let pending = result.count(StepStatus::Pending);

    if satisfied > 0 {
        println!(
            "    • {} steps satisfied ({} changed)",
            satisfied,
            result.mutations()
        );
    }
    if failed > 0 {
        println!("    • {} {} failed", failed, "steps".red());
    }
    if blocked > 0 {
        println!("    • {} steps blocked by failed dependencies", blocked);
    }
    if pending > 0 {
        println!("    • {} steps not started", pending);
    }
}
