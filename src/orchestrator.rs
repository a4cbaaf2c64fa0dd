//! Orchestrator - turns a node profile into a plan and runs it

use crate::profile::NodeProfile;
use crate::roles::{self, RoleTemplate};
use anyhow::Result;
use converge::{
    Actions, ExecutionEngine, FileSpec, PackageSpec, Plan, RecordSet, RecordSink, RepositorySpec,
    RetryPolicy, RunResult, ServiceSpec, StepDescriptor, StepObserver, SystemProbe,
    ValidationError,
};
use std::sync::atomic::AtomicBool;

/// Mode of every configuration file the orchestrator writes
const CONFIG_FILE_MODE: u32 = 0o644;

/// Build the provisioning plan for a profile.
///
/// Deterministic: the same profile always yields the same steps in the same
/// order with the same dependencies.
pub fn build_plan(profile: &NodeProfile) -> Result<Plan, ValidationError> {
    profile.validate()?;
    let role = roles::resolve(profile)?;

    let mut plan = Plan::new();

    // 1. Repository
    let repo = StepDescriptor::repository(repository_spec(role, profile));
    let repo_id = repo.id.clone();
    plan.push(repo);

    // 2. Packages
    let runtime = profile
        .runtime_package
        .as_deref()
        .unwrap_or(role.runtime_package);
    // Repeated names collapse into one step; a pin from any of them is kept
    let mut packages: Vec<PackageSpec> = Vec::new();
    let wanted = [
        (runtime, None),
        (role.agent_package, profile.agent_version.as_deref()),
    ]
    .into_iter()
    .chain(profile.extra_packages.iter().map(|name| (name.as_str(), None)));
    for (name, version) in wanted {
        match packages.iter_mut().find(|p| p.name == name) {
            Some(existing) => {
                if existing.version.is_none() {
                    existing.version = version.map(ToString::to_string);
                }
            }
            None => packages.push(
                PackageSpec::new(name).with_version(version.map(ToString::to_string)),
            ),
        }
    }

    let mut package_ids = Vec::with_capacity(packages.len());
    for spec in packages {
        let step = StepDescriptor::package(spec).depends_on(&repo_id);
        package_ids.push(step.id.clone());
        plan.push(step);
    }

    // 3. Files
    let mut files = Vec::new();
    if let Some(hostname) = &profile.hostname {
        files.push((role.hostname_file, hostname.as_str()));
    }
    files.push((role.endpoint_file, profile.cluster_endpoint.as_str()));
    files.push((role.advertise_ip_file, profile.advertised_address.as_str()));
    files.push((role.work_dir_file, profile.work_dir.as_str()));

    let mut file_ids = Vec::with_capacity(files.len());
    for (path, value) in files {
        let step = StepDescriptor::file(FileSpec::new(
            path,
            format!("{value}\n"),
            CONFIG_FILE_MODE,
        ));
        file_ids.push(step.id.clone());
        plan.push(step);
    }

    // 4. Services: conflicting ones off, then the agent on
    let mut disabled: Vec<&str> = Vec::with_capacity(profile.disable_services.len());
    let mut disable_ids = Vec::with_capacity(profile.disable_services.len());
    for name in &profile.disable_services {
        if disabled.contains(&name.as_str()) {
            continue;
        }
        disabled.push(name);
        let step = package_ids
            .iter()
            .fold(StepDescriptor::service(ServiceSpec::disabled(name)), |s, id| {
                s.depends_on(id)
            });
        disable_ids.push(step.id.clone());
        plan.push(step);
    }

    let agent = package_ids
        .iter()
        .chain(&file_ids)
        .chain(&disable_ids)
        .fold(
            StepDescriptor::service(ServiceSpec::started(role.agent_service)),
            |s, id| s.depends_on(id),
        );
    plan.push(agent);

    plan.validate()?;
    log::debug!("Built plan with {} steps for role {}", plan.len(), role.name);
    Ok(plan)
}

fn repository_spec(role: &RoleTemplate, profile: &NodeProfile) -> RepositorySpec {
    let overrides = &profile.repository;
    RepositorySpec {
        name: role.repository.name.to_string(),
        url: overrides
            .url
            .clone()
            .unwrap_or_else(|| role.repository.url.to_string()),
        suite: overrides
            .suite
            .clone()
            .unwrap_or_else(|| profile.distribution.clone()),
        components: overrides.components.clone().unwrap_or_else(|| {
            role.repository
                .components
                .iter()
                .map(ToString::to_string)
                .collect()
        }),
        signing_key_url: overrides
            .key_url
            .clone()
            .unwrap_or_else(|| role.repository.key_url.to_string()),
    }
}

/// Action run after the engine finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    Reboot,
}

/// Post-run actions for a finished run.
///
/// A reboot needs all of: the profile asking for it, the operator allowing
/// it, a fully successful run, and at least one mutation in that run.
pub fn post_actions(profile: &NodeProfile, result: &RunResult, allow_reboot: bool) -> Vec<PostAction> {
    let mut actions = Vec::new();
    if profile.reboot_after && allow_reboot && result.is_success() && result.mutations() > 0 {
        actions.push(PostAction::Reboot);
    } else if profile.reboot_after {
        log::info!(
            "Reboot requested by profile but not performed (allowed: {}, status: {}, mutations: {})",
            allow_reboot,
            result.status,
            result.mutations()
        );
    }
    actions
}

/// Drives the engine for one profile
pub struct Orchestrator<'a> {
    probe: &'a dyn SystemProbe,
    actions: Actions<'a>,
    policy: RetryPolicy,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(probe: &'a dyn SystemProbe, actions: Actions<'a>) -> Self {
        Self {
            probe,
            actions,
            policy: RetryPolicy::default(),
            cancel: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Build the plan for `profile` and run it against `records`.
    ///
    /// A profile that does not produce a valid plan yields a ValidationError
    /// result without touching the machine.
    pub fn run<S, O>(
        &self,
        profile: &NodeProfile,
        records: &mut RecordSet,
        sink: &mut S,
        observer: &mut O,
    ) -> Result<RunResult>
    where
        S: RecordSink + ?Sized,
        O: StepObserver + ?Sized,
    {
        let plan = match build_plan(profile) {
            Ok(plan) => plan,
            Err(e) => {
                log::error!("Invalid profile: {e}");
                return Ok(RunResult::validation_error(e));
            }
        };

        let mut engine =
            ExecutionEngine::new(self.probe, self.actions).with_retry_policy(self.policy.clone());
        if let Some(flag) = self.cancel {
            engine = engine.with_cancel_flag(flag);
        }

        log::info!(
            "Provisioning {} as {} ({} steps)",
            profile.advertised_address,
            profile.role,
            plan.len()
        );
        engine.run(&plan, records, sink, observer)
    }
}
