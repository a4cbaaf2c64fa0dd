//! Dry-run display - plan preview with file diffs

use crate::system::files;
use anyhow::{Context, Result};
use colored::Colorize;
use converge::{Plan, Preview, ProbeState, StepPayload, StepPreview};
use similar::TextDiff;

/// Unified diff from the current file content to the desired one.
///
/// Empty when the contents are equal.
pub fn render_file_diff(path: &str, current: Option<&[u8]>, desired: &[u8]) -> String {
    if current == Some(desired) {
        return String::new();
    }

    let old = current.map(String::from_utf8_lossy).unwrap_or_default();
    let new = String::from_utf8_lossy(desired);
    let old_header = if current.is_some() {
        format!("{path} (current)")
    } else {
        "/dev/null".to_string()
    };

    TextDiff::from_lines(old.as_ref(), new.as_ref())
        .unified_diff()
        .context_radius(3)
        .header(&old_header, &format!("{path} (desired)"))
        .to_string()
}

/// Diff lines for a file step, read from the live file
fn file_diff_lines(payload: &StepPayload) -> Result<Vec<String>> {
    let StepPayload::FileWrite(spec) = payload else {
        return Ok(Vec::new());
    };

    let current = files::read_current(&spec.path)
        .with_context(|| format!("Failed to read {}", spec.path.display()))?;
    let diff = render_file_diff(
        &spec.path.display().to_string(),
        current.as_deref(),
        &spec.content,
    );

    if diff.is_empty() {
        return Ok(vec![format!("mode → {:o}", spec.mode)]);
    }
    Ok(diff.lines().map(ToString::to_string).collect())
}

fn colorize_diff_line(line: &str) -> String {
    if line.starts_with("+++") || line.starts_with("---") {
        line.bold().to_string()
    } else if line.starts_with('+') {
        line.green().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else if line.starts_with("@@") {
        line.cyan().to_string()
    } else {
        line.dimmed().to_string()
    }
}

fn state_label(step: &StepPreview) -> (String, String) {
    match &step.state {
        ProbeState::Satisfied => ("✓".green().to_string(), "(satisfied)".to_string()),
        ProbeState::Recorded => ("✓".dimmed().to_string(), "(recorded)".to_string()),
        ProbeState::Pending => ("~".yellow().to_string(), "(will change)".to_string()),
        ProbeState::Unknown(reason) => ("?".dimmed().to_string(), format!("(unknown: {reason})")),
    }
}

/// Display a preview in a user-friendly format
pub fn display_preview(plan: &Plan, preview: &Preview) {
    let summary = preview.summary();

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Provisioning Plan".bold()
    );
    println!("│");

    for step in &preview.steps {
        let (symbol, label) = state_label(step);
        println!(
            "│ {} {:<44} {}",
            symbol,
            step.step_id,
            label.dimmed()
        );
        println!("│     {}", step.description.dimmed());

        if !step.waits_on.is_empty() {
            println!("│     {} {}", "after:".dimmed(), step.waits_on.join(", "));
        }

        if step.state.needs_action()
            && let Some(descriptor) = plan.get(&step.step_id)
        {
            match file_diff_lines(&descriptor.payload) {
                Ok(lines) => {
                    for line in lines {
                        println!("│       {}", colorize_diff_line(&line));
                    }
                }
                Err(e) => println!("│       {}", format!("(diff unavailable: {e:#})").dimmed()),
            }
        }
    }

    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    if summary.has_changes() {
        println!(
            "│ Summary: {} changes ({} pending, {} unknown), {} satisfied",
            summary.changes().to_string().bold(),
            summary.pending.to_string().yellow(),
            summary.unknown.to_string().dimmed(),
            summary.satisfied.to_string().green()
        );
    } else {
        println!(
            "│ {} No changes needed ({} steps satisfied)",
            "✓".green(),
            summary.satisfied
        );
    }
    println!("└─────────────────────────────────────────────────────┘");
}
