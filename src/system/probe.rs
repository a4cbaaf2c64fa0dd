//! Read-only state checks against the live machine

use super::{Host, files};
use converge::{StepDescriptor, StepError, StepPayload, SystemProbe};

impl SystemProbe for Host {
    fn is_satisfied(&self, step: &StepDescriptor) -> Result<bool, StepError> {
        let satisfied = match &step.payload {
            StepPayload::PackageInstall(spec) => self.packages.is_installed(spec)?,
            StepPayload::RepositoryRegister(spec) => self.packages.is_registered(spec)?,
            StepPayload::FileWrite(spec) => files::file_matches(&spec.path, &spec.content, spec.mode)
                .map_err(|e| StepError::probe(format!("{}: {e}", spec.path.display())))?,
            StepPayload::ServiceControl(spec) => {
                let status = self.services.query(&spec.name)?;
                status.enabled == spec.enabled && status.running == spec.running
            }
        };
        log::trace!("Probe {}: {}", step.id, satisfied);
        Ok(satisfied)
    }
}
