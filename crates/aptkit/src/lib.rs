//! # aptkit
//!
//! Pure Rust library for apt/dpkg package management.
//!
//! This crate provides functionality for:
//! - Querying installed package versions through dpkg
//! - Installing packages, resolving upstream version pins to full Debian versions
//! - Registering apt sources together with their signing keyrings
//! - Classifying apt failures into transient and permanent categories
//!
//! ## Example
//!
//! ```no_run
//! use aptkit::{AptSource, Client, Package};
//!
//! let client = Client::new().expect("apt not available");
//!
//! let source = AptSource {
//!     name: "mesosphere".into(),
//!     url: "http://repos.mesosphere.com/ubuntu".into(),
//!     suite: "xenial".into(),
//!     components: vec!["main".into()],
//!     key_url: "https://keyserver.ubuntu.com/pks/lookup?op=get&search=0xDF7D54CBE56151BF".into(),
//! };
//! if !client.is_source_registered(&source).unwrap() {
//!     client.register_source(&source).unwrap();
//! }
//!
//! let mesos = Package::new("mesos").with_version("1.4.0");
//! if !client.is_installed(&mesos).unwrap() {
//!     client.install(&mesos).unwrap();
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod keys;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use keys::{HttpKeyFetcher, KeyFetcher, dearmor};
pub use types::{AptPaths, AptSource, Package, version_matches};

use backend::{Backend, apt::AptBackend};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// High-level client for apt operations.
pub struct Client {
    backend: Box<dyn Backend>,
    keys: Box<dyn KeyFetcher>,
    paths: AptPaths,
}

impl Client {
    /// Create a new Client with the real apt backend.
    ///
    /// Returns an error if apt is not installed.
    pub fn new() -> Result<Self> {
        let backend = AptBackend::new()?;
        Ok(Self {
            backend: Box::new(backend),
            keys: Box::new(HttpKeyFetcher::new()),
            paths: AptPaths::default(),
        })
    }

    /// Create a client with custom collaborators (useful for testing).
    pub fn with_backend(
        backend: Box<dyn Backend>,
        keys: Box<dyn KeyFetcher>,
        paths: AptPaths,
    ) -> Self {
        Self {
            backend,
            keys,
            paths,
        }
    }

    /// Check if apt is available.
    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Filesystem locations used for sources and keyrings.
    pub fn paths(&self) -> &AptPaths {
        &self.paths
    }

    // =========================================================================
    // Package Operations
    // =========================================================================

    /// Whether the package is installed and satisfies its version pin.
    pub fn is_installed(&self, package: &Package) -> Result<bool> {
        Ok(self
            .backend
            .installed_version(&package.name)?
            .is_some_and(|installed| package.accepts(&installed)))
    }

    /// Install a package.
    ///
    /// A pin that is not itself an available version is resolved to the
    /// newest candidate it matches, so "1.4.0" installs "1.4.0-2.0.1".
    pub fn install(&self, package: &Package) -> Result<()> {
        let version = match &package.version {
            Some(pin) => Some(self.resolve_version(&package.name, pin)?),
            None => None,
        };
        self.backend.install(&package.name, version.as_deref())
    }

    /// Full version for a pin, newest first among candidates.
    pub fn resolve_version(&self, name: &str, pin: &str) -> Result<String> {
        let candidates = self.backend.candidate_versions(name)?;
        if candidates.iter().any(|v| v == pin) {
            return Ok(pin.to_string());
        }
        candidates
            .into_iter()
            .find(|v| version_matches(v, pin))
            .ok_or_else(|| Error::NotFound {
                name: format!("{name}={pin}"),
            })
    }

    // =========================================================================
    // Source Operations
    // =========================================================================

    /// Whether the source's list file carries its entry line and the keyring
    /// is in place.
    pub fn is_source_registered(&self, source: &AptSource) -> Result<bool> {
        let keyring = source.keyring_path(&self.paths.keyrings_dir);
        if !keyring.exists() {
            return Ok(false);
        }

        let list = source.list_path(&self.paths.sources_dir);
        let content = match fs::read_to_string(&list) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Error::io(list, e)),
        };

        let entry = source.entry_line(&self.paths.keyrings_dir);
        Ok(content.lines().any(|line| line.trim() == entry))
    }

    /// Download the signing key, write it as a binary keyring, write the
    /// list file, then refresh package lists.
    pub fn register_source(&self, source: &AptSource) -> Result<()> {
        let armored = self.keys.fetch(&source.key_url)?;
        let key = keys::dearmor(&source.key_url, &armored)?;

        let keyring = source.keyring_path(&self.paths.keyrings_dir);
        write_replace(&keyring, &key, 0o644)?;
        log::info!("Installed signing key {}", keyring.display());

        let list = source.list_path(&self.paths.sources_dir);
        let entry = format!("{}\n", source.entry_line(&self.paths.keyrings_dir));
        write_replace(&list, entry.as_bytes(), 0o644)?;
        log::info!("Registered apt source {}", list.display());

        self.backend.update()
    }
}

/// Replace `path` with `content` and `mode`: temp file in the same
/// directory, fsync, rename, then fsync the directory.
fn write_replace(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Other(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".aptkit-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| Error::io(parent, e))?;
    tmp.write_all(content).map_err(|e| Error::io(path, e))?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(mode))
        .map_err(|e| Error::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;

    fs::File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| Error::io(parent, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeState {
        installed: HashMap<String, String>,
        candidates: HashMap<String, Vec<String>>,
        updates: usize,
        install_calls: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct FakeBackend(Arc<Mutex<FakeState>>);

    impl Backend for FakeBackend {
        fn is_available(&self) -> bool {
            true
        }

        fn installed_version(&self, name: &str) -> Result<Option<String>> {
            Ok(self.0.lock().unwrap().installed.get(name).cloned())
        }

        fn candidate_versions(&self, name: &str) -> Result<Vec<String>> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .candidates
                .get(name)
                .cloned()
                .unwrap_or_default())
        }

        fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
            let mut state = self.0.lock().unwrap();
            let version = version.unwrap_or("1.0-1").to_string();
            state.install_calls.push(format!("{name}={version}"));
            state.installed.insert(name.to_string(), version);
            Ok(())
        }

        fn update(&self) -> Result<()> {
            self.0.lock().unwrap().updates += 1;
            Ok(())
        }
    }

    struct StaticKey(&'static [u8]);

    impl KeyFetcher for StaticKey {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            Ok(self.0.to_vec())
        }
    }

    const KEY: &[u8] = b"-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nmQAOBFpbXF0BAAirze8SNFY=\n=DlVK\n-----END PGP PUBLIC KEY BLOCK-----\n";

    const KEYRING: &[u8] = &[
        0x99, 0x00, 0x0e, 0x04, 0x5a, 0x5b, 0x5c, 0x5d, 0x01, 0x00, 0x08, 0xab, 0xcd, 0xef, 0x12,
        0x34, 0x56,
    ];

    fn temp_entries(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with(".aptkit-"))
            .collect()
    }

    fn client(root: &Path, backend: FakeBackend, key: &'static [u8]) -> Client {
        Client::with_backend(Box::new(backend), Box::new(StaticKey(key)), AptPaths::under(root))
    }

    fn source() -> AptSource {
        AptSource {
            name: "mesosphere".to_string(),
            url: "http://repos.mesosphere.com/ubuntu".to_string(),
            suite: "xenial".to_string(),
            components: vec!["main".to_string()],
            key_url: "https://keys.example/mesosphere".to_string(),
        }
    }

    #[test]
    fn test_register_source_writes_keyring_and_list() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::default();
        let client = client(dir.path(), backend.clone(), KEY);

        assert!(!client.is_source_registered(&source()).unwrap());
        client.register_source(&source()).unwrap();
        assert!(client.is_source_registered(&source()).unwrap());

        let keyring = source().keyring_path(&client.paths().keyrings_dir);
        assert_eq!(keyring.extension().unwrap(), "gpg");
        assert_eq!(fs::read(&keyring).unwrap(), KEYRING);
        let list = fs::read_to_string(source().list_path(&client.paths().sources_dir)).unwrap();
        assert!(list.contains(&format!("[signed-by={}]", keyring.display())));
        assert_eq!(
            fs::metadata(&keyring).unwrap().permissions().mode() & 0o7777,
            0o644
        );
        assert_eq!(backend.0.lock().unwrap().updates, 1);
        assert!(temp_entries(&client.paths().keyrings_dir).is_empty());
        assert!(temp_entries(&client.paths().sources_dir).is_empty());
    }

    #[test]
    fn test_write_replace_overwrites_with_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sources.list.d").join("mesosphere.list");

        write_replace(&path, b"old\n", 0o600).unwrap();
        write_replace(&path, b"new\n", 0o644).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new\n");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o7777, 0o644);
        assert!(temp_entries(path.parent().unwrap()).is_empty());
    }

    #[test]
    fn test_write_replace_failure_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("mesosphere.gpg");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("occupied"), "x").unwrap();

        let err = write_replace(&target, KEYRING, 0o644).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(temp_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_changed_suite_is_not_registered() {
        let dir = TempDir::new().unwrap();
        let client = client(dir.path(), FakeBackend::default(), KEY);
        client.register_source(&source()).unwrap();

        let mut bionic = source();
        bionic.suite = "bionic".to_string();
        assert!(!client.is_source_registered(&bionic).unwrap());
    }

    #[test]
    fn test_register_source_rejects_invalid_key() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::default();
        let client = client(dir.path(), backend.clone(), b"<html>not found</html>");

        let err = client.register_source(&source()).unwrap_err();
        assert!(matches!(err, Error::InvalidKey { .. }));
        assert!(!client.is_source_registered(&source()).unwrap());
        assert_eq!(backend.0.lock().unwrap().updates, 0);
    }

    #[test]
    fn test_install_resolves_upstream_pin() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::default();
        backend.0.lock().unwrap().candidates.insert(
            "mesos".to_string(),
            vec!["1.5.0-2.0.2".to_string(), "1.4.0-2.0.1".to_string()],
        );
        let client = client(dir.path(), backend.clone(), KEY);
        let mesos = Package::new("mesos").with_version("1.4.0");

        assert!(!client.is_installed(&mesos).unwrap());
        client.install(&mesos).unwrap();
        assert!(client.is_installed(&mesos).unwrap());
        assert_eq!(
            backend.0.lock().unwrap().install_calls,
            vec!["mesos=1.4.0-2.0.1"]
        );
    }

    #[test]
    fn test_install_unknown_pin_is_not_found() {
        let dir = TempDir::new().unwrap();
        let client = client(dir.path(), FakeBackend::default(), KEY);

        let err = client
            .install(&Package::new("mesos").with_version("9.9"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_installed_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::default();
        backend
            .0
            .lock()
            .unwrap()
            .installed
            .insert("mesos".to_string(), "1.3.2-2.0.1".to_string());
        let client = client(dir.path(), backend, KEY);

        assert!(client.is_installed(&Package::new("mesos")).unwrap());
        assert!(!client.is_installed(&Package::new("mesos").with_version("1.4.0")).unwrap());
    }
}
