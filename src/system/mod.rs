//! Host collaborators: apt, filesystem and init system
//!
//! [`Host`] bundles the real implementations of the engine's collaborator
//! traits and answers probes against the live machine.

pub mod files;
pub mod packages;
mod probe;
pub mod services;

use crate::profile::InitSystem;
use converge::{Actions, ServiceManager};
use files::AtomicFileWriter;
use packages::AptInstaller;

/// The machine being provisioned
pub struct Host {
    packages: AptInstaller,
    files: AtomicFileWriter,
    services: Box<dyn ServiceManager>,
}

impl Host {
    /// Real collaborators for this machine
    pub fn detect(init: InitSystem) -> Self {
        log::debug!("Using {init} service backend");
        Self::new(AptInstaller::detect(), services::service_manager(init))
    }

    pub fn new(packages: AptInstaller, services: Box<dyn ServiceManager>) -> Self {
        Self {
            packages,
            files: AtomicFileWriter,
            services,
        }
    }

    pub fn actions(&self) -> Actions<'_> {
        Actions {
            packages: &self.packages,
            files: &self.files,
            services: self.services.as_ref(),
        }
    }

    pub fn packages(&self) -> &AptInstaller {
        &self.packages
    }

    pub fn services(&self) -> &dyn ServiceManager {
        self.services.as_ref()
    }
}
