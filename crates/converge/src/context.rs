//! Collaborator and observer traits
//!
//! These traits let the engine run without depending on a specific package
//! manager, filesystem or init system. The binary wires in real
//! implementations; tests wire in fakes.

use crate::error::StepError;
use crate::record::ExecutionRecord;
use crate::types::{RepositorySpec, StepDescriptor};
use std::path::Path;
use std::time::Duration;

/// Read-only view of current machine state
///
/// Implementations must not mutate anything. Absence of the probed resource
/// means "not satisfied", not an error.
pub trait SystemProbe: Send + Sync {
    /// Whether the step's target state already holds
    fn is_satisfied(&self, step: &StepDescriptor) -> Result<bool, StepError>;
}

/// Installs packages and registers package repositories
pub trait PackageInstaller: Send + Sync {
    fn install(&self, name: &str, version: Option<&str>) -> Result<(), StepError>;

    fn register_repository(&self, repository: &RepositorySpec) -> Result<(), StepError>;
}

/// Writes files atomically
pub trait FileWriter: Send + Sync {
    /// Replace `path` with `content` and `mode`.
    ///
    /// A partially written file must never be observable: either the old
    /// file or the new one is visible, on every exit path.
    fn write(&self, path: &Path, content: &[u8], mode: u32) -> Result<(), StepError>;
}

/// Observed state of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceStatus {
    pub enabled: bool,
    pub running: bool,
}

/// Controls system services
pub trait ServiceManager: Send + Sync {
    fn set_state(&self, name: &str, enabled: bool, running: bool) -> Result<(), StepError>;

    /// Current state; a missing unit reports disabled and stopped
    fn query(&self, name: &str) -> Result<ServiceStatus, StepError>;

    /// Reboot the machine; only used as an explicit post-run action
    fn reboot(&self) -> Result<(), StepError>;
}

/// The external collaborators that perform step actions
#[derive(Clone, Copy)]
pub struct Actions<'a> {
    pub packages: &'a dyn PackageInstaller,
    pub files: &'a dyn FileWriter,
    pub services: &'a dyn ServiceManager,
}

/// Observer for engine progress
///
/// Implement this trait to receive progress updates during a run.
pub trait StepObserver {
    /// Called before a step is probed
    fn on_step_start(&mut self, index: usize, total: usize, step: &StepDescriptor);

    /// Called before another attempt of a failed step
    fn on_retry(&mut self, step: &StepDescriptor, attempt: u32, error: &StepError, delay: Duration);

    /// Called when a step reaches a terminal status for this run
    fn on_step_complete(&mut self, step: &StepDescriptor, record: &ExecutionRecord);
}

/// No-op observer
pub struct NoObserver;

impl StepObserver for NoObserver {
    fn on_step_start(&mut self, _index: usize, _total: usize, _step: &StepDescriptor) {}
    fn on_retry(&mut self, _: &StepDescriptor, _: u32, _: &StepError, _: Duration) {}
    fn on_step_complete(&mut self, _step: &StepDescriptor, _record: &ExecutionRecord) {}
}
