//! Node profiles - what a node should become
//!
//! A profile is assembled from an optional TOML/JSON file and command-line
//! flags (flags win), filled with defaults, then validated. Once built it is
//! immutable; its content hash identifies the plan derived from it.

use crate::paths;
use anyhow::{Context, Result};
use clap::ValueEnum;
use converge::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

/// Default agent work directory
pub const DEFAULT_WORK_DIR: &str = "/var/lib/mesos";

/// Default distribution codename
pub const DEFAULT_DISTRIBUTION: &str = "xenial";

const HOSTNAME_PATTERN: &str =
    r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$";
const PACKAGE_PATTERN: &str = r"^[a-z0-9][a-z0-9+.-]+$";
const SERVICE_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9@._-]*$";
const CODENAME_PATTERN: &str = r"^[a-z][a-z0-9-]*$";

/// Init system managing services on the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InitSystem {
    #[default]
    Systemd,
    Upstart,
}

impl fmt::Display for InitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Systemd => write!(f, "systemd"),
            Self::Upstart => write!(f, "upstart"),
        }
    }
}

/// Replacements for the role's package repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_url: Option<String>,
}

impl RepositoryOverride {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A validated node profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProfile {
    /// Role name from the role catalog (e.g., "mesos-agent")
    pub role: String,
    /// Address the agent registers with
    pub cluster_endpoint: String,
    /// Address the agent advertises to the cluster
    pub advertised_address: String,
    /// Agent work directory (absolute)
    pub work_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Distribution codename; selects the repository suite
    pub distribution: String,
    pub init_system: InitSystem,
    /// Agent package version pin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    /// Container runtime package replacing the role default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_package: Option<String>,
    pub extra_packages: Vec<String>,
    /// Services to stop and disable before starting the agent
    pub disable_services: Vec<String>,
    /// Reboot after a successful run that changed something
    pub reboot_after: bool,
    #[serde(skip_serializing_if = "RepositoryOverride::is_empty")]
    pub repository: RepositoryOverride,
}

impl NodeProfile {
    /// Content hash identifying the plan built from this profile.
    ///
    /// blake3 over the JSON serialization; field order is fixed by the struct.
    pub fn content_hash(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self).context("Failed to serialize profile")?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    /// Check field formats; role-specific checks live in the role catalog.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("role", &self.role)?;
        require("cluster_endpoint", &self.cluster_endpoint)?;
        require("advertised_address", &self.advertised_address)?;

        if self.advertised_address.trim().parse::<IpAddr>().is_err() {
            return Err(invalid(
                "advertised_address",
                format!("'{}' is not an IP address", self.advertised_address),
            ));
        }

        if !Path::new(&self.work_dir).is_absolute() {
            return Err(invalid(
                "work_dir",
                format!("'{}' must be an absolute path", self.work_dir),
            ));
        }

        if let Some(hostname) = &self.hostname {
            check_pattern("hostname", hostname, HOSTNAME_PATTERN)?;
        }

        check_pattern("distribution", &self.distribution, CODENAME_PATTERN)?;

        if let Some(pkg) = &self.runtime_package {
            check_pattern("runtime_package", pkg, PACKAGE_PATTERN)?;
        }
        for pkg in &self.extra_packages {
            check_pattern("extra_packages", pkg, PACKAGE_PATTERN)?;
        }
        for service in &self.disable_services {
            check_pattern("disable_services", service, SERVICE_PATTERN)?;
        }
        if let Some(version) = &self.agent_version {
            require("agent_version", version)?;
            if version.chars().any(char::is_whitespace) {
                return Err(invalid("agent_version", "must not contain whitespace"));
            }
        }
        if let Some(suite) = &self.repository.suite {
            check_pattern("repository.suite", suite, CODENAME_PATTERN)?;
        }

        Ok(())
    }
}

/// Profile fields as read from a file or the command line; all optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileSource {
    pub role: Option<String>,
    pub cluster_endpoint: Option<String>,
    pub advertised_address: Option<String>,
    pub work_dir: Option<String>,
    pub hostname: Option<String>,
    pub distribution: Option<String>,
    pub init_system: Option<InitSystem>,
    pub agent_version: Option<String>,
    pub runtime_package: Option<String>,
    pub extra_packages: Option<Vec<String>>,
    pub disable_services: Option<Vec<String>>,
    pub reboot_after: Option<bool>,
    pub repository: Option<RepositoryOverride>,
}

impl ProfileSource {
    /// Load a profile file; `.json` is JSON, anything else TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let path = paths::expand(&path.to_string_lossy());
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read profile: {}", path.display()))?;

        let source = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse profile: {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse profile: {}", path.display()))?
        };

        log::debug!("Loaded profile from {}", path.display());
        Ok(source)
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: Self) -> Self {
        Self {
            role: other.role.or(self.role),
            cluster_endpoint: other.cluster_endpoint.or(self.cluster_endpoint),
            advertised_address: other.advertised_address.or(self.advertised_address),
            work_dir: other.work_dir.or(self.work_dir),
            hostname: other.hostname.or(self.hostname),
            distribution: other.distribution.or(self.distribution),
            init_system: other.init_system.or(self.init_system),
            agent_version: other.agent_version.or(self.agent_version),
            runtime_package: other.runtime_package.or(self.runtime_package),
            extra_packages: other.extra_packages.or(self.extra_packages),
            disable_services: other.disable_services.or(self.disable_services),
            reboot_after: other.reboot_after.or(self.reboot_after),
            repository: other.repository.or(self.repository),
        }
    }

    /// Fill defaults, expand paths and validate.
    pub fn build(self) -> Result<NodeProfile, ValidationError> {
        let work_dir = self
            .work_dir
            .map(|w| paths::expand(w.trim()).to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_WORK_DIR.to_string());

        let profile = NodeProfile {
            role: self
                .role
                .map(|r| r.trim().to_string())
                .ok_or_else(|| ValidationError::MissingField("role".to_string()))?,
            cluster_endpoint: self
                .cluster_endpoint
                .map(|e| e.trim().to_string())
                .ok_or_else(|| ValidationError::MissingField("cluster_endpoint".to_string()))?,
            advertised_address: self
                .advertised_address
                .map(|a| a.trim().to_string())
                .ok_or_else(|| ValidationError::MissingField("advertised_address".to_string()))?,
            work_dir,
            hostname: self.hostname.map(|h| h.trim().to_string()),
            distribution: self
                .distribution
                .unwrap_or_else(|| DEFAULT_DISTRIBUTION.to_string()),
            init_system: self.init_system.unwrap_or_default(),
            agent_version: self.agent_version,
            runtime_package: self.runtime_package,
            extra_packages: self.extra_packages.unwrap_or_default(),
            disable_services: self.disable_services.unwrap_or_default(),
            reboot_after: self.reboot_after.unwrap_or(false),
            repository: self.repository.unwrap_or_default(),
        };

        profile.validate()?;
        Ok(profile)
    }
}

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidField {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Check `value` against a regex pattern
pub(crate) fn check_pattern(field: &str, value: &str, pattern: &str) -> Result<(), ValidationError> {
    let re = Regex::new(pattern).map_err(|e| ValidationError::Other(e.to_string()))?;
    if re.is_match(value) {
        Ok(())
    } else {
        Err(invalid(field, format!("'{value}' is not valid")))
    }
}
