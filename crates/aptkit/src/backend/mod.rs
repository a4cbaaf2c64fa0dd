//! Backend abstraction for apt operations.
//!
//! The [`Backend`] trait covers the commands that touch the package database,
//! allowing the real CLI to be swapped for a fake in tests.

pub mod apt;

use crate::error::Result;

/// Backend trait for apt/dpkg operations.
pub trait Backend: Send + Sync {
    /// Check if apt tooling is available.
    fn is_available(&self) -> bool;

    /// Installed version of a package, `None` when not installed.
    ///
    /// Packages removed but not purged (`deinstall ok config-files`) count
    /// as not installed.
    fn installed_version(&self, name: &str) -> Result<Option<String>>;

    /// Versions available from configured sources, newest first.
    fn candidate_versions(&self, name: &str) -> Result<Vec<String>>;

    /// Install a package at an exact version, or the candidate when `None`.
    fn install(&self, name: &str, version: Option<&str>) -> Result<()>;

    /// Refresh package lists (`apt-get update`).
    fn update(&self) -> Result<()>;
}
