//! Real apt CLI backend using `apt-get`, `apt-cache` and `dpkg-query`.

use crate::backend::Backend;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::{Command, Output};

/// Backend that executes real apt commands.
pub struct AptBackend {
    apt_get: PathBuf,
    apt_cache: PathBuf,
    dpkg_query: PathBuf,
}

impl AptBackend {
    /// Create a new AptBackend.
    ///
    /// Returns an error if the apt tools are not in PATH.
    pub fn new() -> Result<Self> {
        Ok(Self {
            apt_get: find_tool("apt-get")?,
            apt_cache: find_tool("apt-cache")?,
            dpkg_query: find_tool("dpkg-query")?,
        })
    }

    /// Run a command non-interactively and return its output.
    fn run(&self, program: &PathBuf, args: &[&str]) -> Result<Output> {
        log::debug!("Running: {} {}", program.display(), args.join(" "));
        Command::new(program)
            .args(args)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .env("LC_ALL", "C")
            .output()
            .map_err(|e| Error::CommandFailed {
                message: format!("failed to execute {}: {}", program.display(), e),
                stderr: String::new(),
            })
    }

    /// Run a command and check for success.
    fn run_checked(
        &self,
        program: &PathBuf,
        args: &[&str],
        package_name: Option<&str>,
    ) -> Result<String> {
        let output = self.run(program, args)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_apt_output(&stderr, package_name));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Backend for AptBackend {
    fn is_available(&self) -> bool {
        self.run(&self.apt_get, &["--version"])
            .is_ok_and(|o| o.status.success())
    }

    fn installed_version(&self, name: &str) -> Result<Option<String>> {
        let output = self.run(&self.dpkg_query, &["-W", "-f=${Status}\t${Version}", name])?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.to_lowercase().contains("no packages found") {
                return Ok(None);
            }
            return Err(Error::from_apt_output(&stderr, Some(name)));
        }

        Ok(parse_dpkg_query(&String::from_utf8_lossy(&output.stdout)))
    }

    fn candidate_versions(&self, name: &str) -> Result<Vec<String>> {
        let stdout = self.run_checked(&self.apt_cache, &["madison", name], Some(name))?;
        Ok(parse_madison(&stdout, name))
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
        let target = match version {
            Some(v) => format!("{name}={v}"),
            None => name.to_string(),
        };
        self.run_checked(
            &self.apt_get,
            &[
                "install",
                "-y",
                "-q",
                "-o",
                "Dpkg::Options::=--force-confdef",
                "-o",
                "Dpkg::Options::=--force-confold",
                &target,
            ],
            Some(&target),
        )?;
        Ok(())
    }

    fn update(&self) -> Result<()> {
        let output = self.run(&self.apt_get, &["update", "-q"])?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        // Older apt exits 0 even when some lists failed to download
        if !output.status.success() || stderr.contains("Failed to fetch") {
            return Err(Error::from_apt_output(&stderr, None));
        }
        Ok(())
    }
}

/// Find an apt tool in PATH.
fn find_tool(name: &'static str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::AptNotFound(name))
}

/// Parse `dpkg-query -W -f='${Status}\t${Version}'` output.
///
/// Only `install ok installed` counts; half-installed, config-files and
/// similar states are reported as not installed.
fn parse_dpkg_query(stdout: &str) -> Option<String> {
    let line = stdout.lines().next()?;
    let (status, version) = line.split_once('\t')?;
    if status.trim() == "install ok installed" && !version.trim().is_empty() {
        Some(version.trim().to_string())
    } else {
        None
    }
}

/// Parse `apt-cache madison <name>` output into versions, newest first.
///
/// Lines look like ` mesos | 1.4.0-2.0.1 | http://repos... xenial/main amd64 Packages`.
fn parse_madison(stdout: &str, name: &str) -> Vec<String> {
    let mut versions: Vec<String> = Vec::new();
    for line in stdout.lines() {
        let mut fields = line.split('|').map(str::trim);
        let (Some(pkg), Some(version)) = (fields.next(), fields.next()) else {
            continue;
        };
        if pkg == name && !version.is_empty() && !versions.iter().any(|v| v == version) {
            versions.push(version.to_string());
        }
    }
    versions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dpkg_query_installed() {
        assert_eq!(
            parse_dpkg_query("install ok installed\t1.4.0-2.0.1"),
            Some("1.4.0-2.0.1".to_string())
        );
    }

    #[test]
    fn test_parse_dpkg_query_not_installed() {
        assert_eq!(parse_dpkg_query("deinstall ok config-files\t1.4.0-2.0.1"), None);
        assert_eq!(parse_dpkg_query("unknown ok not-installed\t"), None);
        assert_eq!(parse_dpkg_query(""), None);
    }

    #[test]
    fn test_parse_madison() {
        let out = " mesos | 1.4.0-2.0.1 | http://repos.mesosphere.com/ubuntu xenial/main amd64 Packages\n\
                   \x20mesos | 1.3.2-2.0.1 | http://repos.mesosphere.com/ubuntu xenial/main amd64 Packages\n\
                   \x20mesos | 1.3.2-2.0.1 | http://repos.mesosphere.com/ubuntu xenial/main Sources\n";
        assert_eq!(parse_madison(out, "mesos"), vec!["1.4.0-2.0.1", "1.3.2-2.0.1"]);
    }

    #[test]
    fn test_parse_madison_ignores_other_packages() {
        let out = " mesos-dev | 1.4.0-1 | http://x xenial/main amd64 Packages\n";
        assert!(parse_madison(out, "mesos").is_empty());
    }
}
