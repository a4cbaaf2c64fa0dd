//! apt-backed package installer

use aptkit::{AptSource, Client, Package};
use converge::{PackageInstaller, PackageSpec, RepositorySpec, StepError};

/// Installs packages and registers sources through apt.
///
/// Holds the reason instead of a client on hosts without apt, so read-only
/// commands can still report every other step.
pub struct AptInstaller {
    client: Result<Client, String>,
}

impl AptInstaller {
    /// Installer for the host's apt
    pub fn detect() -> Self {
        let client = Client::new().map_err(|e| {
            log::debug!("apt unavailable: {e}");
            e.to_string()
        });
        Self { client }
    }

    #[cfg(test)]
    pub fn with_client(client: Client) -> Self {
        Self { client: Ok(client) }
    }

    pub fn is_available(&self) -> bool {
        self.client.as_ref().is_ok_and(Client::is_available)
    }

    fn client(&self) -> Result<&Client, StepError> {
        self.client
            .as_ref()
            .map_err(|reason| StepError::permanent(reason.clone()))
    }

    /// Whether the package is installed and satisfies its pin
    pub fn is_installed(&self, spec: &PackageSpec) -> Result<bool, StepError> {
        self.client()
            .map_err(|e| StepError::probe(e.to_string()))?
            .is_installed(&package(spec))
            .map_err(|e| StepError::probe(e.to_string()))
    }

    /// Whether the source list and keyring are in place
    pub fn is_registered(&self, spec: &RepositorySpec) -> Result<bool, StepError> {
        self.client()
            .map_err(|e| StepError::probe(e.to_string()))?
            .is_source_registered(&source(spec))
            .map_err(|e| StepError::probe(e.to_string()))
    }
}

impl PackageInstaller for AptInstaller {
    fn install(&self, name: &str, version: Option<&str>) -> Result<(), StepError> {
        let mut package = Package::new(name);
        if let Some(version) = version {
            package = package.with_version(version);
        }
        log::info!("Installing {package}");
        self.client()?.install(&package).map_err(step_error)
    }

    fn register_repository(&self, repository: &RepositorySpec) -> Result<(), StepError> {
        log::info!(
            "Registering repository {} ({} {})",
            repository.name,
            repository.url,
            repository.suite
        );
        self.client()?
            .register_source(&source(repository))
            .map_err(step_error)
    }
}

fn package(spec: &PackageSpec) -> Package {
    match &spec.version {
        Some(version) => Package::new(&spec.name).with_version(version),
        None => Package::new(&spec.name),
    }
}

fn source(spec: &RepositorySpec) -> AptSource {
    AptSource {
        name: spec.name.clone(),
        url: spec.url.clone(),
        suite: spec.suite.clone(),
        components: spec.components.clone(),
        key_url: spec.signing_key_url.clone(),
    }
}

/// Network and lock failures are worth another attempt; the rest are not
pub(crate) fn step_error(err: aptkit::Error) -> StepError {
    let category = err.category();
    let message = format!("{err} ({})", category.advice());
    if err.is_retryable() {
        StepError::transient(message)
    } else {
        StepError::permanent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aptkit::backend::Backend;
    use aptkit::{AptPaths, KeyFetcher};
    use tempfile::TempDir;

    struct LockedBackend;

    impl Backend for LockedBackend {
        fn is_available(&self) -> bool {
            true
        }

        fn installed_version(&self, name: &str) -> aptkit::Result<Option<String>> {
            Ok((name == "docker.io").then(|| "1.13.1-0ubuntu1".to_string()))
        }

        fn candidate_versions(&self, _name: &str) -> aptkit::Result<Vec<String>> {
            Ok(vec!["1.4.0-2.0.1".to_string()])
        }

        fn install(&self, name: &str, _version: Option<&str>) -> aptkit::Result<()> {
            Err(aptkit::Error::from_apt_output(
                "E: Could not get lock /var/lib/dpkg/lock-frontend",
                Some(name),
            ))
        }

        fn update(&self) -> aptkit::Result<()> {
            Ok(())
        }
    }

    /// Keyserver answering with an HTML page
    struct NoKey;

    impl KeyFetcher for NoKey {
        fn fetch(&self, _url: &str) -> aptkit::Result<Vec<u8>> {
            Ok(b"<html></html>".to_vec())
        }
    }

    fn installer(dir: &TempDir) -> AptInstaller {
        AptInstaller::with_client(Client::with_backend(
            Box::new(LockedBackend),
            Box::new(NoKey),
            AptPaths::under(dir.path()),
        ))
    }

    fn repository() -> RepositorySpec {
        RepositorySpec {
            name: "mesosphere".to_string(),
            url: "http://repos.mesosphere.com/ubuntu".to_string(),
            suite: "xenial".to_string(),
            components: vec!["main".to_string()],
            signing_key_url: "https://keys.example/mesosphere".to_string(),
        }
    }

    #[test]
    fn test_lock_is_transient() {
        let dir = TempDir::new().unwrap();
        let err = installer(&dir).install("mesos", Some("1.4.0")).unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn test_invalid_key_is_permanent() {
        let dir = TempDir::new().unwrap();
        let err = installer(&dir)
            .register_repository(&repository())
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_probe_queries() {
        let dir = TempDir::new().unwrap();
        let installer = installer(&dir);

        assert!(installer.is_installed(&PackageSpec::new("docker.io")).unwrap());
        assert!(!installer.is_installed(&PackageSpec::new("mesos")).unwrap());
        assert!(!installer.is_registered(&repository()).unwrap());
    }

    #[test]
    fn test_missing_apt_reports_reason() {
        let installer = AptInstaller {
            client: Err("apt not installed".to_string()),
        };
        assert!(!installer.is_available());

        let err = installer.install("mesos", None).unwrap_err();
        assert_eq!(err, StepError::permanent("apt not installed"));

        let err = installer.is_installed(&PackageSpec::new("mesos")).unwrap_err();
        assert!(matches!(err, StepError::Probe(_)));
    }
}
