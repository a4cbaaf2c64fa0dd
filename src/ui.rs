use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Colored status symbol for a step status
pub fn status_symbol(status: converge::StepStatus) -> String {
    use converge::StepStatus;

    match status {
        StepStatus::Satisfied => "✓".green().to_string(),
        StepStatus::Failed => "✗".red().to_string(),
        StepStatus::Blocked => "⊘".yellow().to_string(),
        StepStatus::Running => "▸".cyan().to_string(),
        StepStatus::Pending => "·".dimmed().to_string(),
    }
}

/// Truncate a string for display, keeping the start
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = text.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}
