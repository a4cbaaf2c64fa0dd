//! Centralized path resolution for nodeup
//!
//! # Environment Variables
//!
//! - `NODEUP_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For state_dir():
//! 1. `--state-dir` command-line option
//! 2. `NODEUP_STATE_DIR` environment variable
//! 3. `/var/lib/nodeup` when running as root
//! 4. `~/.local/state/nodeup`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "NODEUP_STATE_DIR";

/// State directory used by root runs
pub const SYSTEM_STATE_DIR: &str = "/var/lib/nodeup";

/// File name of the execution record file inside the state directory
pub const RECORDS_FILE: &str = "records.toml";

/// Get the nodeup state directory path
pub fn state_dir(cli_override: Option<&Path>) -> Result<PathBuf> {
    resolve_state_dir(
        cli_override,
        std::env::var(ENV_STATE_DIR).ok(),
        crate::privilege::is_root(),
    )
}

fn resolve_state_dir(
    cli_override: Option<&Path>,
    env_override: Option<String>,
    is_root: bool,
) -> Result<PathBuf> {
    if let Some(dir) = cli_override {
        let path = expand(&dir.to_string_lossy());
        log::debug!("Using state dir from --state-dir: {}", path.display());
        return Ok(path);
    }

    if let Some(dir) = env_override.filter(|d| !d.trim().is_empty()) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if is_root {
        log::debug!("Using system state dir: {SYSTEM_STATE_DIR}");
        return Ok(PathBuf::from(SYSTEM_STATE_DIR));
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("nodeup");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Path of the record file in `state_dir`
pub fn records_file(state_dir: &Path) -> PathBuf {
    state_dir.join(RECORDS_FILE)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as-is.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
