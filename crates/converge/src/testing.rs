//! In-memory machine for engine tests
//!
//! Enabled for dependents with the `testing` feature.

use crate::context::{
    Actions, FileWriter, PackageInstaller, ServiceManager, ServiceStatus, SystemProbe,
};
use crate::error::StepError;
use crate::executor::ExecutionEngine;
use crate::retry::RetryPolicy;
use crate::types::{RepositorySpec, StepDescriptor, StepPayload};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Machine state held in memory; every action is logged by step id
#[derive(Default)]
pub struct FakeHost {
    packages: Mutex<HashMap<String, String>>,
    repositories: Mutex<HashSet<String>>,
    files: Mutex<HashMap<PathBuf, (Vec<u8>, u32)>>,
    services: Mutex<HashMap<String, ServiceStatus>>,
    /// Scripted failures per subject, consumed one per call
    failures: Mutex<HashMap<String, VecDeque<StepError>>>,
    probe_errors: Mutex<HashSet<String>>,
    inert: Mutex<HashSet<String>>,
    actions: Mutex<Vec<String>>,
    probes: Mutex<Vec<String>>,
}

impl FakeHost {
    /// Empty machine: nothing installed, written or running
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` actions on `subject` with `error`
    pub fn fail(&self, subject: &str, error: StepError, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(subject.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Probing `step_id` fails until the host is dropped
    pub fn probe_error(&self, step_id: &str) {
        self.probe_errors.lock().unwrap().insert(step_id.to_string());
    }

    /// Actions on `subject` report success without changing anything
    pub fn inert(&self, subject: &str) {
        self.inert.lock().unwrap().insert(subject.to_string());
    }

    /// Actions taken so far, as step ids
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    /// Step ids probed so far
    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().unwrap().clone()
    }

    /// Forget logged actions and probes
    pub fn clear_log(&self) {
        self.actions.lock().unwrap().clear();
        self.probes.lock().unwrap().clear();
    }

    /// Content and mode written to `path`
    pub fn file(&self, path: &str) -> Option<(Vec<u8>, u32)> {
        self.files.lock().unwrap().get(Path::new(path)).cloned()
    }

    /// Engine over this host with three immediate attempts
    pub fn engine(&self) -> ExecutionEngine<'_> {
        ExecutionEngine::new(self, self.actions_ref()).with_retry_policy(RetryPolicy::immediate(3))
    }

    /// This host as the engine's collaborators
    pub fn actions_ref(&self) -> Actions<'_> {
        Actions {
            packages: self,
            files: self,
            services: self,
        }
    }

    fn act(&self, label: String, subject: &str) -> Result<bool, StepError> {
        self.actions.lock().unwrap().push(label);
        if let Some(err) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(subject)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(!self.inert.lock().unwrap().contains(subject))
    }
}

impl SystemProbe for FakeHost {
    fn is_satisfied(&self, step: &StepDescriptor) -> Result<bool, StepError> {
        self.probes.lock().unwrap().push(step.id.clone());
        if self.probe_errors.lock().unwrap().contains(&step.id) {
            return Err(StepError::probe("state unavailable"));
        }

        Ok(match &step.payload {
            StepPayload::PackageInstall(p) => {
                let packages = self.packages.lock().unwrap();
                match (&p.version, packages.get(&p.name)) {
                    (_, None) => false,
                    (None, Some(_)) => true,
                    (Some(want), Some(have)) => want == have,
                }
            }
            StepPayload::RepositoryRegister(r) => {
                self.repositories.lock().unwrap().contains(&r.name)
            }
            StepPayload::FileWrite(f) => self
                .files
                .lock()
                .unwrap()
                .get(&f.path)
                .is_some_and(|(content, mode)| *content == f.content && *mode == f.mode),
            StepPayload::ServiceControl(s) => {
                let status = self.query(&s.name)?;
                status.enabled == s.enabled && status.running == s.running
            }
        })
    }
}

impl PackageInstaller for FakeHost {
    fn install(&self, name: &str, version: Option<&str>) -> Result<(), StepError> {
        if self.act(format!("install-package:{name}"), name)? {
            self.packages.lock().unwrap().insert(
                name.to_string(),
                version.unwrap_or("1.0").to_string(),
            );
        }
        Ok(())
    }

    fn register_repository(&self, repository: &RepositorySpec) -> Result<(), StepError> {
        let name = &repository.name;
        if self.act(format!("register-repository:{name}"), name)? {
            self.repositories.lock().unwrap().insert(name.clone());
        }
        Ok(())
    }
}

impl FileWriter for FakeHost {
    fn write(&self, path: &Path, content: &[u8], mode: u32) -> Result<(), StepError> {
        let subject = path.display().to_string();
        if self.act(format!("write-file:{subject}"), &subject)? {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), (content.to_vec(), mode));
        }
        Ok(())
    }
}

impl ServiceManager for FakeHost {
    fn set_state(&self, name: &str, enabled: bool, running: bool) -> Result<(), StepError> {
        if self.act(format!("service:{name}"), name)? {
            self.services
                .lock()
                .unwrap()
                .insert(name.to_string(), ServiceStatus { enabled, running });
        }
        Ok(())
    }

    fn query(&self, name: &str) -> Result<ServiceStatus, StepError> {
        Ok(self
            .services
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or_default())
    }

    fn reboot(&self) -> Result<(), StepError> {
        self.actions.lock().unwrap().push("reboot".to_string());
        Ok(())
    }
}
