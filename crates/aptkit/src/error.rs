//! Error types for apt/dpkg operations.
//!
//! Errors are categorized so callers can tell transient failures (a mirror
//! that timed out, another process holding the dpkg lock) from permanent ones
//! (a package that does not exist, missing privileges).

use std::path::PathBuf;
use thiserror::Error;

/// Categories of apt errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable)
    Network,
    /// Another apt/dpkg process holds the lock (transient, retryable)
    Locked,
    /// Package or version not available from any configured source
    NotFound,
    /// Permission denied (not running as root)
    Permission,
    /// apt-get or dpkg-query not installed
    AptNotFound,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Locked)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Locked => "Package database locked",
            Self::NotFound => "Package not found",
            Self::Permission => "Permission denied",
            Self::AptNotFound => "apt not installed",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check network access to the package mirror and try again",
            Self::Locked => "Wait for the other package manager process (e.g. unattended-upgrades) to finish",
            Self::NotFound => "Verify the package name and that its repository is registered",
            Self::Permission => "Run as root",
            Self::AptNotFound => "This host does not look like a Debian/Ubuntu system",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur during apt operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-related error (DNS, connection, mirror hash mismatch)
    #[error("network error: {message}")]
    Network {
        /// Detailed error message
        message: String,
    },

    /// The dpkg or apt lists lock is held by another process
    #[error("package database locked: {message}")]
    Locked {
        /// Lock diagnostic from apt
        message: String,
    },

    /// Package or requested version not available
    #[error("package not found: {name}")]
    NotFound {
        /// Name of the package (with version pin, if any)
        name: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Details about what permission was denied
        message: String,
    },

    /// apt tooling not found in PATH
    #[error("{0} not found in PATH")]
    AptNotFound(&'static str),

    /// Downloaded signing key is unusable
    #[error("invalid signing key from {url}: {message}")]
    InvalidKey {
        /// Where the key was fetched from
        url: String,
        /// Why it was rejected
        message: String,
    },

    /// Command execution failed
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// IO error on a specific path
    #[error("{}: {source}", path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::Locked { .. } => ErrorCategory::Locked,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::AptNotFound(_) => ErrorCategory::AptNotFound,
            Error::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorCategory::Permission
            }
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Wrap an IO error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an error from apt-get/dpkg output.
    ///
    /// Analyzes stderr to categorize the error appropriately.
    pub fn from_apt_output(stderr: &str, package_name: Option<&str>) -> Self {
        let stderr_lower = stderr.to_lowercase();

        // Permission errors
        if stderr_lower.contains("permission denied")
            || stderr_lower.contains("are you root")
            || stderr_lower.contains("operation not permitted")
        {
            return Error::Permission {
                message: stderr.trim().to_string(),
            };
        }

        // Lock contention
        if stderr_lower.contains("could not get lock")
            || stderr_lower.contains("unable to lock")
            || stderr_lower.contains("unable to acquire the dpkg frontend lock")
            || stderr_lower.contains("is another process using it")
        {
            return Error::Locked {
                message: stderr.trim().to_string(),
            };
        }

        // Not found errors
        if stderr_lower.contains("unable to locate package")
            || stderr_lower.contains("has no installation candidate")
            || (stderr_lower.contains("version '") && stderr_lower.contains("was not found"))
        {
            return Error::NotFound {
                name: package_name.unwrap_or("unknown").to_string(),
            };
        }

        // Network errors
        if stderr_lower.contains("temporary failure resolving")
            || stderr_lower.contains("could not resolve")
            || stderr_lower.contains("failed to fetch")
            || stderr_lower.contains("connection timed out")
            || stderr_lower.contains("connection failed")
            || stderr_lower.contains("unable to connect")
            || stderr_lower.contains("network is unreachable")
            || stderr_lower.contains("hash sum mismatch")
            || stderr_lower.contains("some index files failed to download")
        {
            return Error::Network {
                message: stderr.trim().to_string(),
            };
        }

        Error::CommandFailed {
            message: format!(
                "apt command failed{}",
                package_name
                    .map(|n| format!(" for {n}"))
                    .unwrap_or_default()
            ),
            stderr: stderr.trim().to_string(),
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) if code >= 500 || code == 429 => Self::Network {
                message: format!("HTTP {code}"),
            },
            ureq::Error::StatusCode(code) => Self::Other(format!("HTTP {code}")),
            other => Self::Network {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for apt operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::Locked.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Permission.is_retryable());
    }

    #[test]
    fn test_from_apt_output_lock() {
        let err = Error::from_apt_output(
            "E: Could not get lock /var/lib/dpkg/lock-frontend - open (11: Resource temporarily unavailable)\n\
             E: Unable to acquire the dpkg frontend lock (/var/lib/dpkg/lock-frontend), is another process using it?",
            Some("mesos"),
        );
        assert_eq!(err.category(), ErrorCategory::Locked);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_apt_output_network() {
        let err = Error::from_apt_output(
            "E: Failed to fetch http://repos.mesosphere.com/ubuntu/pool/main/m/mesos/mesos_1.4.0.deb  \
             Temporary failure resolving 'repos.mesosphere.com'",
            Some("mesos"),
        );
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_apt_output_not_found() {
        let err = Error::from_apt_output("E: Unable to locate package mesoss", Some("mesoss"));
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "package not found: mesoss");

        let err = Error::from_apt_output(
            "E: Version '9.9' for 'mesos' was not found",
            Some("mesos=9.9"),
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_from_apt_output_permission() {
        let err = Error::from_apt_output(
            "E: Could not open lock file /var/lib/dpkg/lock-frontend - open (13: Permission denied)\n\
             E: Unable to acquire the dpkg frontend lock, are you root?",
            None,
        );
        assert_eq!(err.category(), ErrorCategory::Permission);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_apt_output_other() {
        let err = Error::from_apt_output("dpkg: error processing package", Some("mesos"));
        assert_eq!(err.category(), ErrorCategory::Other);
        assert!(err.to_string().contains("for mesos"));
    }

    #[test]
    fn test_io_permission_category() {
        let err = Error::io(
            "/etc/apt/keyrings/x.gpg",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.category(), ErrorCategory::Permission);
    }
}
