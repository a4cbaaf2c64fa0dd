//! Effective-user checks for mutating runs

use converge::ValidationError;

/// Whether the process runs with effective uid 0
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Fail unless running as root
pub fn require_root(action: &str) -> Result<(), ValidationError> {
    if !is_root() {
        return Err(ValidationError::Other(format!(
            "{action} must run as root (try: sudo nodeup {action} ...)"
        )));
    }
    Ok(())
}
