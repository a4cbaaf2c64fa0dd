//! Core types for declarative provisioning steps

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of provisioning action a step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Install an OS package
    PackageInstall,
    /// Register an OS package repository
    RepositoryRegister,
    /// Write a file with exact content and mode
    FileWrite,
    /// Bring a service to an enabled/running state
    ServiceControl,
}

impl StepKind {
    /// Prefix used when building step ids
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::PackageInstall => "install-package",
            Self::RepositoryRegister => "register-repository",
            Self::FileWrite => "write-file",
            Self::ServiceControl => "service",
        }
    }

    /// Whether failures of this kind are typically transient.
    ///
    /// Network fetches and package installs may be retried; file writes and
    /// service control fail for non-transient reasons (permissions, missing
    /// unit) and get exactly one attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PackageInstall | Self::RepositoryRegister)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PackageInstall => "package",
            Self::RepositoryRegister => "repository",
            Self::FileWrite => "file",
            Self::ServiceControl => "service",
        };
        write!(f, "{name}")
    }
}

/// A package to install, optionally pinned to a version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }
}

/// An OS package repository with its signing key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySpec {
    /// Short name, used for the source list and keyring file names
    pub name: String,
    pub url: String,
    pub suite: String,
    pub components: Vec<String>,
    /// Where the repository's signing key is downloaded from
    pub signing_key_url: String,
}

/// A file with exact content and permission bits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub mode: u32,
}

impl FileSpec {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Vec<u8>>, mode: u32) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            mode,
        }
    }
}

/// Desired state of a system service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub enabled: bool,
    pub running: bool,
}

impl ServiceSpec {
    /// Enabled at boot and running now
    pub fn started(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            running: true,
        }
    }

    /// Disabled at boot and stopped now
    pub fn disabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: false,
            running: false,
        }
    }
}

/// Kind-specific parameters of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPayload {
    PackageInstall(PackageSpec),
    RepositoryRegister(RepositorySpec),
    FileWrite(FileSpec),
    ServiceControl(ServiceSpec),
}

impl StepPayload {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::PackageInstall(_) => StepKind::PackageInstall,
            Self::RepositoryRegister(_) => StepKind::RepositoryRegister,
            Self::FileWrite(_) => StepKind::FileWrite,
            Self::ServiceControl(_) => StepKind::ServiceControl,
        }
    }

    /// Stable subject of the step, the part after the kind prefix in its id
    pub fn subject(&self) -> String {
        match self {
            Self::PackageInstall(p) => p.name.clone(),
            Self::RepositoryRegister(r) => r.name.clone(),
            Self::FileWrite(f) => f.path.display().to_string(),
            Self::ServiceControl(s) => s.name.clone(),
        }
    }
}

/// One declarative provisioning action and its preconditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub id: String,
    pub payload: StepPayload,
    /// Steps that must be Satisfied before this one may execute
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Re-executing with no state change is safe
    pub idempotent: bool,
}

impl StepDescriptor {
    /// Create a step whose id is derived from its payload
    /// (e.g. `install-package:mesos`)
    pub fn new(payload: StepPayload) -> Self {
        let id = format!("{}:{}", payload.kind().prefix(), payload.subject());
        Self {
            id,
            payload,
            depends_on: Vec::new(),
            idempotent: true,
        }
    }

    pub fn package(spec: PackageSpec) -> Self {
        Self::new(StepPayload::PackageInstall(spec))
    }

    pub fn repository(spec: RepositorySpec) -> Self {
        Self::new(StepPayload::RepositoryRegister(spec))
    }

    pub fn file(spec: FileSpec) -> Self {
        Self::new(StepPayload::FileWrite(spec))
    }

    pub fn service(spec: ServiceSpec) -> Self {
        Self::new(StepPayload::ServiceControl(spec))
    }

    /// Add a dependency, ignoring duplicates
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    pub fn kind(&self) -> StepKind {
        self.payload.kind()
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        match &self.payload {
            StepPayload::PackageInstall(p) => match &p.version {
                Some(v) => format!("Install package {} ({})", p.name, v),
                None => format!("Install package {}", p.name),
            },
            StepPayload::RepositoryRegister(r) => {
                format!("Register repository {} ({} {})", r.name, r.url, r.suite)
            }
            StepPayload::FileWrite(f) => {
                format!("Write {} (mode {:o})", f.path.display(), f.mode)
            }
            StepPayload::ServiceControl(s) => {
                let enabled = if s.enabled { "enabled" } else { "disabled" };
                let running = if s.running { "running" } else { "stopped" };
                format!("Set service {} {}, {}", s.name, enabled, running)
            }
        }
    }
}
