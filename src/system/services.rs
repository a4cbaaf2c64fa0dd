//! Init-system backends: systemd and upstart

use super::files;
use crate::profile::InitSystem;
use crate::runner::{CommandOutput, CommandRunner, SystemRunner};
use converge::{ServiceManager, ServiceStatus, StepError};
use std::fs;
use std::io;
use std::path::PathBuf;

/// Service manager for the given init system
pub fn service_manager(init: InitSystem) -> Box<dyn ServiceManager> {
    match init {
        InitSystem::Systemd => Box::new(Systemd::new(Box::new(SystemRunner))),
        InitSystem::Upstart => Box::new(Upstart::new(Box::new(SystemRunner))),
    }
}

fn spawn_error(cmd: &str, err: io::Error) -> StepError {
    if err.kind() == io::ErrorKind::NotFound {
        StepError::permanent(format!("{cmd} not found"))
    } else {
        StepError::from(err)
    }
}

fn check(cmd: &str, args: &[&str], output: CommandOutput) -> Result<(), StepError> {
    if output.success {
        Ok(())
    } else {
        Err(StepError::permanent(format!(
            "{} {} failed: {}",
            cmd,
            args.join(" "),
            output.diagnostic()
        )))
    }
}

// ============================================================================
// systemd
// ============================================================================

/// Whether an `is-enabled` state means the unit comes up at boot.
///
/// `static` and `indirect` units have no install section of their own and are
/// pulled in by other units; `disable` leaves them as they are, so a disable
/// step on such a unit does not converge.
fn starts_at_boot(state: &str) -> bool {
    matches!(
        state,
        "enabled" | "enabled-runtime" | "alias" | "static" | "indirect" | "generated"
    )
}

pub struct Systemd {
    runner: Box<dyn CommandRunner>,
}

impl Systemd {
    pub fn new(runner: Box<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn systemctl(&self, args: &[&str]) -> Result<CommandOutput, StepError> {
        self.runner
            .run("systemctl", args)
            .map_err(|e| spawn_error("systemctl", e))
    }

    fn systemctl_ok(&self, args: &[&str]) -> Result<(), StepError> {
        let output = self.systemctl(args)?;
        check("systemctl", args, output)
    }
}

impl ServiceManager for Systemd {
    fn set_state(&self, name: &str, enabled: bool, running: bool) -> Result<(), StepError> {
        match (enabled, running) {
            (true, true) => self.systemctl_ok(&["enable", "--now", name]),
            (false, false) => self.systemctl_ok(&["disable", "--now", name]),
            (enabled, running) => {
                self.systemctl_ok(&[if enabled { "enable" } else { "disable" }, name])?;
                self.systemctl_ok(&[if running { "start" } else { "stop" }, name])
            }
        }
    }

    fn query(&self, name: &str) -> Result<ServiceStatus, StepError> {
        // Both exit non-zero for disabled, inactive and unknown units
        let enabled = self.systemctl(&["is-enabled", name])?;
        let active = self.systemctl(&["is-active", name])?;
        Ok(ServiceStatus {
            enabled: starts_at_boot(enabled.stdout.trim()),
            running: active.stdout.trim() == "active",
        })
    }

    fn reboot(&self) -> Result<(), StepError> {
        log::warn!("Rebooting via systemctl");
        self.systemctl_ok(&["reboot"])
    }
}

// ============================================================================
// upstart
// ============================================================================

/// Upstart jobs; boot-time start is controlled by `<job>.override` files
/// holding `manual`.
pub struct Upstart {
    runner: Box<dyn CommandRunner>,
    init_dir: PathBuf,
}

impl Upstart {
    pub fn new(runner: Box<dyn CommandRunner>) -> Self {
        Self {
            runner,
            init_dir: PathBuf::from("/etc/init"),
        }
    }

    #[cfg(test)]
    pub fn with_init_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.init_dir = dir.into();
        self
    }

    fn override_path(&self, name: &str) -> PathBuf {
        self.init_dir.join(format!("{name}.override"))
    }

    fn is_manual(&self, name: &str) -> Result<bool, StepError> {
        let path = self.override_path(name);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content.lines().any(|l| l.trim() == "manual")),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StepError::probe(format!("{}: {e}", path.display()))),
        }
    }

    fn job_exists(&self, name: &str) -> bool {
        self.init_dir.join(format!("{name}.conf")).exists()
    }

    fn is_running(&self, name: &str) -> Result<bool, StepError> {
        let output = self
            .runner
            .run("status", &[name])
            .map_err(|e| spawn_error("status", e))?;
        // "mesos-slave start/running, process 1234"
        Ok(output.success && output.stdout.contains("start/running"))
    }

    fn service(&self, name: &str, action: &str) -> Result<(), StepError> {
        let args = [name, action];
        let output = self
            .runner
            .run("service", &args)
            .map_err(|e| spawn_error("service", e))?;
        check("service", &args, output)
    }

    fn set_manual(&self, name: &str, manual: bool) -> Result<(), StepError> {
        let path = self.override_path(name);
        if manual {
            files::write_atomic(&path, b"manual\n", 0o644)
                .map_err(|e| StepError::permanent(format!("{}: {e}", path.display())))
        } else {
            match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StepError::permanent(format!("{}: {e}", path.display()))),
            }
        }
    }
}

impl ServiceManager for Upstart {
    fn set_state(&self, name: &str, enabled: bool, running: bool) -> Result<(), StepError> {
        if enabled && !self.job_exists(name) {
            return Err(StepError::permanent(format!(
                "upstart job {name} not found in {}",
                self.init_dir.display()
            )));
        }
        self.set_manual(name, !enabled)?;

        match (running, self.is_running(name)?) {
            (true, false) => self.service(name, "start"),
            (false, true) => self.service(name, "stop"),
            _ => Ok(()),
        }
    }

    fn query(&self, name: &str) -> Result<ServiceStatus, StepError> {
        Ok(ServiceStatus {
            enabled: self.job_exists(name) && !self.is_manual(name)?,
            running: self.is_running(name)?,
        })
    }

    fn reboot(&self) -> Result<(), StepError> {
        log::warn!("Rebooting");
        let output = self
            .runner
            .run("reboot", &[])
            .map_err(|e| spawn_error("reboot", e))?;
        check("reboot", &[], output)
    }
}
