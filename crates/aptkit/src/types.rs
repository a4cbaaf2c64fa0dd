//! Core types for apt package management.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A package to install, optionally pinned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package name (e.g., "mesos", "docker.io")
    pub name: String,
    /// Version pin; either a full Debian version or an upstream prefix
    /// such as "1.4.0" matching "1.4.0-2.0.1"
    pub version: Option<String>,
}

impl Package {
    /// Create a new unpinned package.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Set the version pin.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Whether an installed version satisfies this package's pin.
    pub fn accepts(&self, installed: &str) -> bool {
        self.version
            .as_deref()
            .is_none_or(|pin| version_matches(installed, pin))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}={}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Whether `installed` satisfies `pin`: exact match, or `pin` is the
/// upstream part followed by a Debian revision.
pub fn version_matches(installed: &str, pin: &str) -> bool {
    installed == pin
        || installed
            .strip_prefix(pin)
            .is_some_and(|rest| rest.starts_with('-'))
}

/// An apt source: one `deb` line plus the keyring that signs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AptSource {
    /// Short name; names the list and keyring files
    pub name: String,
    /// Repository base URL
    pub url: String,
    /// Distribution codename (e.g., "xenial")
    pub suite: String,
    /// Components (e.g., ["main"])
    pub components: Vec<String>,
    /// Where the ASCII-armored signing key is downloaded from
    pub key_url: String,
}

impl AptSource {
    /// Keyring file for this source under `keyrings_dir`.
    pub fn keyring_path(&self, keyrings_dir: &Path) -> PathBuf {
        keyrings_dir.join(format!("{}.gpg", self.name))
    }

    /// List file for this source under `sources_dir`.
    pub fn list_path(&self, sources_dir: &Path) -> PathBuf {
        sources_dir.join(format!("{}.list", self.name))
    }

    /// The `deb` line for the list file, pinned to the keyring.
    pub fn entry_line(&self, keyrings_dir: &Path) -> String {
        let mut line = format!(
            "deb [signed-by={}] {} {}",
            self.keyring_path(keyrings_dir).display(),
            self.url.trim_end_matches('/'),
            self.suite
        );
        for component in &self.components {
            line.push(' ');
            line.push_str(component);
        }
        line
    }
}

/// Filesystem locations apt reads sources and keyrings from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptPaths {
    /// Directory of `.list` files
    pub sources_dir: PathBuf,
    /// Directory of signing keyrings
    pub keyrings_dir: PathBuf,
}

impl Default for AptPaths {
    fn default() -> Self {
        Self {
            sources_dir: PathBuf::from("/etc/apt/sources.list.d"),
            keyrings_dir: PathBuf::from("/etc/apt/keyrings"),
        }
    }
}

impl AptPaths {
    /// Paths rooted under `root` (tests, chroots).
    pub fn under(root: &Path) -> Self {
        let defaults = Self::default();
        Self {
            sources_dir: root.join(defaults.sources_dir.strip_prefix("/").unwrap_or(&defaults.sources_dir)),
            keyrings_dir: root.join(defaults.keyrings_dir.strip_prefix("/").unwrap_or(&defaults.keyrings_dir)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesosphere() -> AptSource {
        AptSource {
            name: "mesosphere".to_string(),
            url: "http://repos.mesosphere.com/ubuntu/".to_string(),
            suite: "xenial".to_string(),
            components: vec!["main".to_string()],
            key_url: "https://keyserver.ubuntu.com/pks/lookup?op=get&search=0xDF7D54CBE56151BF"
                .to_string(),
        }
    }

    #[test]
    fn test_version_matches() {
        assert!(version_matches("1.4.0-2.0.1", "1.4.0"));
        assert!(version_matches("1.4.0-2.0.1", "1.4.0-2.0.1"));
        assert!(!version_matches("1.4.01-1", "1.4.0"));
        assert!(!version_matches("1.3.2-1", "1.4.0"));
    }

    #[test]
    fn test_package_accepts() {
        assert!(Package::new("mesos").accepts("anything"));
        assert!(Package::new("mesos").with_version("1.4.0").accepts("1.4.0-2.0.1"));
        assert!(!Package::new("mesos").with_version("1.4.0").accepts("1.5.0-1"));
        assert_eq!(Package::new("mesos").with_version("1.4.0").to_string(), "mesos=1.4.0");
    }

    #[test]
    fn test_entry_line() {
        let paths = AptPaths::default();
        assert_eq!(
            mesosphere().entry_line(&paths.keyrings_dir),
            "deb [signed-by=/etc/apt/keyrings/mesosphere.gpg] http://repos.mesosphere.com/ubuntu xenial main"
        );
        assert_eq!(
            mesosphere().list_path(&paths.sources_dir),
            PathBuf::from("/etc/apt/sources.list.d/mesosphere.list")
        );
        assert_eq!(
            mesosphere().keyring_path(&paths.keyrings_dir),
            PathBuf::from("/etc/apt/keyrings/mesosphere.gpg")
        );
    }

    #[test]
    fn test_paths_under_root() {
        let paths = AptPaths::under(Path::new("/tmp/chroot"));
        assert_eq!(paths.sources_dir, PathBuf::from("/tmp/chroot/etc/apt/sources.list.d"));
        assert_eq!(paths.keyrings_dir, PathBuf::from("/tmp/chroot/etc/apt/keyrings"));
    }
}
