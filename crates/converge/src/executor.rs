//! Execution engine - applies plans step by step, resumably

use crate::context::{Actions, NoObserver, StepObserver, SystemProbe};
use crate::error::StepError;
use crate::planner::Plan;
use crate::record::{NoPersist, RecordSet, RecordSink, StepStatus};
use crate::retry::{RetryPolicy, with_retry};
use crate::types::{StepDescriptor, StepKind, StepPayload};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step is Satisfied
    Success,
    /// Some steps Failed, were Blocked, or were not reached
    PartialFailure,
    /// The profile or plan was malformed; nothing executed
    ValidationError,
}

impl RunStatus {
    /// Process exit code for this status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::PartialFailure => 1,
            Self::ValidationError => 2,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::PartialFailure => "partial failure",
            Self::ValidationError => "validation error",
        };
        write!(f, "{name}")
    }
}

/// Terminal status of one step in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub step_id: String,
    pub kind: StepKind,
    pub description: String,
    pub status: StepStatus,
    /// Attempts made during this run
    pub attempts: u32,
    /// Whether an action was executed against the machine
    pub mutated: bool,
    /// Satisfied from a previous run's records, not probed
    #[serde(default)]
    pub resumed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    /// One report per step, in execution order
    pub steps: Vec<StepReport>,
    /// The run stopped early on request
    #[serde(default)]
    pub cancelled: bool,
    /// Validation diagnostic when status is ValidationError
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    /// A run rejected before anything executed
    pub fn validation_error(error: impl fmt::Display) -> Self {
        Self {
            status: RunStatus::ValidationError,
            steps: Vec::new(),
            cancelled: false,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    /// Number of steps that ended with the given status
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Number of steps that ran an action
    pub fn mutations(&self) -> usize {
        self.steps.iter().filter(|s| s.mutated).count()
    }

    pub fn step(&self, step_id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }
}

/// Applies a plan against the machine
///
/// Steps run sequentially in dependency order. Each step is probed first and
/// only executed when not already satisfied; after executing, it is probed
/// again to confirm convergence. Failed steps block their dependents but not
/// independent branches. Records are persisted after every transition.
pub struct ExecutionEngine<'a> {
    probe: &'a dyn SystemProbe,
    actions: Actions<'a>,
    policy: RetryPolicy,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(probe: &'a dyn SystemProbe, actions: Actions<'a>) -> Self {
        Self {
            probe,
            actions,
            policy: RetryPolicy::default(),
            cancel: None,
        }
    }

    /// Retry policy for transient-prone steps
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop at the next safe checkpoint once `flag` is set
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Run a plan without persistence or progress reporting
    pub fn run_simple(&self, plan: &Plan, records: &mut RecordSet) -> Result<RunResult> {
        self.run(plan, records, &mut NoPersist, &mut NoObserver)
    }

    /// Run a plan, updating `records` and persisting them through `sink`.
    ///
    /// Steps already Satisfied in `records` are skipped without probing, so
    /// passing the records of an interrupted run resumes it.
    ///
    /// Returns `Err` only when records cannot be persisted; step failures are
    /// reported in the [`RunResult`].
    pub fn run<S, O>(
        &self,
        plan: &Plan,
        records: &mut RecordSet,
        sink: &mut S,
        observer: &mut O,
    ) -> Result<RunResult>
    where
        S: RecordSink + ?Sized,
        O: StepObserver + ?Sized,
    {
        let order = match plan.topological_order() {
            Ok(order) => order,
            Err(e) => {
                log::error!("Plan rejected: {e}");
                return Ok(RunResult::validation_error(e));
            }
        };

        records.ensure(plan);
        let total = order.len();
        let mut reports = Vec::with_capacity(total);
        let mut cancelled = false;

        for (index, step) in order.iter().enumerate() {
            if !cancelled && self.is_cancelled() {
                log::warn!("Cancellation requested, stopping before {}", step.id);
                cancelled = true;
            }
            if cancelled {
                reports.push(self.untouched_report(step, records));
                continue;
            }

            observer.on_step_start(index, total, step);
            let report = self.run_step(step, records, sink, observer)?;
            if let Some(record) = records.get(&step.id) {
                observer.on_step_complete(step, record);
            }
            reports.push(report);
        }

        let status = if !cancelled && reports.iter().all(|r| r.status == StepStatus::Satisfied) {
            RunStatus::Success
        } else {
            RunStatus::PartialFailure
        };

        Ok(RunResult {
            status,
            steps: reports,
            cancelled,
            error: None,
        })
    }

    fn run_step<S, O>(
        &self,
        step: &StepDescriptor,
        records: &mut RecordSet,
        sink: &mut S,
        observer: &mut O,
    ) -> Result<StepReport>
    where
        S: RecordSink + ?Sized,
        O: StepObserver + ?Sized,
    {
        let mut report = StepReport {
            step_id: step.id.clone(),
            kind: step.kind(),
            description: step.description(),
            status: StepStatus::Pending,
            attempts: 0,
            mutated: false,
            resumed: false,
            error: None,
        };

        if records.status(&step.id) == StepStatus::Satisfied {
            log::info!("{}: satisfied in previous run", step.id);
            report.status = StepStatus::Satisfied;
            report.resumed = true;
            return Ok(report);
        }

        if let Some(dep) = step
            .depends_on
            .iter()
            .find(|d| records.status(d) != StepStatus::Satisfied)
        {
            let reason = format!("blocked by {} ({})", dep, records.status(dep));
            log::warn!("{}: {}", step.id, reason);
            self.transition(records, sink, &step.id, StepStatus::Blocked, Some(reason.clone()))?;
            report.status = StepStatus::Blocked;
            report.error = Some(reason);
            return Ok(report);
        }

        match self.probe.is_satisfied(step) {
            Ok(true) => {
                log::info!("{}: already satisfied", step.id);
                self.transition(records, sink, &step.id, StepStatus::Satisfied, None)?;
                report.status = StepStatus::Satisfied;
                return Ok(report);
            }
            Ok(false) => {}
            Err(e) => log::warn!("{}: {}; treating as not satisfied", step.id, e),
        }

        self.transition(records, sink, &step.id, StepStatus::Running, None)?;

        let policy = if step.kind().is_retryable() {
            self.policy.clone()
        } else {
            RetryPolicy::no_retry()
        };

        let outcome = with_retry(
            &policy,
            |attempt, err, delay| {
                log::warn!(
                    "{}: attempt {}/{} failed: {}; retrying in {:?}",
                    step.id,
                    attempt,
                    policy.max_attempts,
                    err,
                    delay
                );
                observer.on_retry(step, attempt, err, delay);
            },
            || self.is_cancelled(),
            || {
                self.apply(step)?;
                self.confirm(step)
            },
        );

        report.attempts = outcome.attempts;
        report.mutated = true;
        records.record_mut(&step.id).attempts += outcome.attempts;

        match outcome.result {
            Ok(()) => {
                log::info!("{}: satisfied after {} attempt(s)", step.id, outcome.attempts);
                self.transition(records, sink, &step.id, StepStatus::Satisfied, None)?;
                report.status = StepStatus::Satisfied;
            }
            Err(e) => {
                log::error!("{}: failed: {}", step.id, e);
                let message = e.to_string();
                self.transition(records, sink, &step.id, StepStatus::Failed, Some(message.clone()))?;
                report.status = StepStatus::Failed;
                report.error = Some(message);
            }
        }

        Ok(report)
    }

    /// Perform the step's action through its collaborator
    fn apply(&self, step: &StepDescriptor) -> Result<(), StepError> {
        match &step.payload {
            StepPayload::PackageInstall(p) => {
                self.actions.packages.install(&p.name, p.version.as_deref())
            }
            StepPayload::RepositoryRegister(r) => self.actions.packages.register_repository(r),
            StepPayload::FileWrite(f) => self.actions.files.write(&f.path, &f.content, f.mode),
            StepPayload::ServiceControl(s) => {
                self.actions.services.set_state(&s.name, s.enabled, s.running)
            }
        }
    }

    /// Re-probe after an action; success without convergence is a failure
    fn confirm(&self, step: &StepDescriptor) -> Result<(), StepError> {
        match self.probe.is_satisfied(step) {
            Ok(true) => Ok(()),
            Ok(false) => Err(StepError::permanent(format!(
                "action completed but {} did not converge",
                step.id
            ))),
            Err(e) => Err(StepError::permanent(format!(
                "could not confirm {}: {}",
                step.id, e
            ))),
        }
    }

    fn transition<S: RecordSink + ?Sized>(
        &self,
        records: &mut RecordSet,
        sink: &mut S,
        step_id: &str,
        status: StepStatus,
        error: Option<String>,
    ) -> Result<()> {
        let record = records.record_mut(step_id);
        record.status = status;
        record.last_error = error;
        sink.persist(records)
            .with_context(|| format!("Failed to persist execution records after {step_id}"))
    }

    fn untouched_report(&self, step: &StepDescriptor, records: &RecordSet) -> StepReport {
        let record = records.get(&step.id);
        StepReport {
            step_id: step.id.clone(),
            kind: step.kind(),
            description: step.description(),
            status: records.status(&step.id),
            attempts: 0,
            mutated: false,
            resumed: false,
            error: record.and_then(|r| r.last_error.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ExecutionRecord;
    use crate::testing::FakeHost;
    use crate::types::{FileSpec, PackageSpec, RepositorySpec, ServiceSpec};
    use std::cell::Cell;
    use std::time::Duration;

    fn agent_plan() -> Plan {
        let repo = StepDescriptor::repository(RepositorySpec {
            name: "mesosphere".into(),
            url: "http://repos.mesosphere.com/ubuntu".into(),
            suite: "xenial".into(),
            components: vec!["main".into()],
            signing_key_url: "https://keys.example/mesosphere.asc".into(),
        });
        let runtime =
            StepDescriptor::package(PackageSpec::new("docker.io")).depends_on(&repo.id);
        let agent = StepDescriptor::package(PackageSpec::new("mesos")).depends_on(&repo.id);
        let zk = StepDescriptor::file(FileSpec::new(
            "/etc/mesos/zk",
            "zk://10.0.0.1:2181/mesos\n",
            0o644,
        ));
        let ip = StepDescriptor::file(FileSpec::new(
            "/etc/mesos-slave/advertise_ip",
            "10.0.0.5\n",
            0o644,
        ));
        let work = StepDescriptor::file(FileSpec::new(
            "/etc/mesos-slave/work_dir",
            "/var/lib/mesos\n",
            0o644,
        ));
        let service = StepDescriptor::service(ServiceSpec::started("mesos-slave"))
            .depends_on(&runtime.id)
            .depends_on(&agent.id)
            .depends_on(&zk.id)
            .depends_on(&ip.id)
            .depends_on(&work.id);

        vec![repo, runtime, agent, zk, ip, work, service]
            .into_iter()
            .collect()
    }

    fn chain(n: usize) -> Plan {
        (1..=n)
            .map(|i| {
                let step = StepDescriptor::package(PackageSpec::new(format!("s{i}")));
                if i == 1 {
                    step
                } else {
                    step.depends_on(format!("install-package:s{}", i - 1))
                }
            })
            .collect()
    }

    struct CountingSink {
        persisted: usize,
        fail: bool,
    }

    impl RecordSink for CountingSink {
        fn persist(&mut self, _records: &RecordSet) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("disk full");
            }
            self.persisted += 1;
            Ok(())
        }
    }

    #[test]
    fn test_fresh_machine_converges() {
        let host = FakeHost::new();
        let plan = agent_plan();
        let mut records = RecordSet::for_plan("h", &plan);

        let result = host.engine().run_simple(&plan, &mut records).unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.steps.len(), 7);
        assert_eq!(result.count(StepStatus::Satisfied), 7);
        assert_eq!(result.mutations(), 7);
        assert_eq!(records.count(StepStatus::Satisfied), 7);
        assert_eq!(
            host.file("/etc/mesos/zk"),
            Some((b"zk://10.0.0.1:2181/mesos\n".to_vec(), 0o644))
        );
        // Service comes last
        assert_eq!(host.actions().last().unwrap(), "service:mesos-slave");
    }

    #[test]
    fn test_second_run_performs_no_mutations() {
        let host = FakeHost::new();
        let plan = agent_plan();
        let mut records = RecordSet::for_plan("h", &plan);
        host.engine().run_simple(&plan, &mut records).unwrap();
        host.clear_log();

        // Fresh records: every step is probed and found satisfied
        let mut records = RecordSet::for_plan("h", &plan);
        let result = host.engine().run_simple(&plan, &mut records).unwrap();

        assert!(result.is_success());
        assert_eq!(result.mutations(), 0);
        assert!(host.actions().is_empty());
        assert_eq!(host.probes().len(), 7);
    }

    #[test]
    fn test_transient_failures_exhaust_attempts_and_block_dependents() {
        let host = FakeHost::new();
        host.fail("mesos", StepError::transient("connection timed out"), 3);
        let plan = agent_plan();
        let mut records = RecordSet::for_plan("h", &plan);

        let result = host.engine().run_simple(&plan, &mut records).unwrap();

        assert_eq!(result.status, RunStatus::PartialFailure);
        assert_eq!(result.exit_code(), 1);

        let agent = result.step("install-package:mesos").unwrap();
        assert_eq!(agent.status, StepStatus::Failed);
        assert_eq!(agent.attempts, 3);
        assert!(agent.error.as_deref().unwrap().contains("timed out"));

        let service = result.step("service:mesos-slave").unwrap();
        assert_eq!(service.status, StepStatus::Blocked);
        assert!(!service.mutated);
        assert!(
            service
                .error
                .as_deref()
                .unwrap()
                .contains("install-package:mesos")
        );

        // Independent branches still converge
        for id in [
            "install-package:docker.io",
            "write-file:/etc/mesos/zk",
            "write-file:/etc/mesos-slave/advertise_ip",
            "write-file:/etc/mesos-slave/work_dir",
        ] {
            assert_eq!(result.step(id).unwrap().status, StepStatus::Satisfied, "{id}");
        }

        let record = records.get("install-package:mesos").unwrap();
        assert_eq!(record.attempts, 3);
        assert_eq!(record.status, StepStatus::Failed);
    }

    #[test]
    fn test_resume_skips_satisfied_steps() {
        let host = FakeHost::new();
        host.fail("s3", StepError::permanent("dpkg error"), 1);
        let plan = chain(5);
        let mut records = RecordSet::for_plan("h", &plan);

        let first = host.engine().run_simple(&plan, &mut records).unwrap();
        assert_eq!(first.count(StepStatus::Satisfied), 2);
        assert_eq!(first.step("install-package:s3").unwrap().status, StepStatus::Failed);
        assert_eq!(first.count(StepStatus::Blocked), 2);

        host.clear_log();
        let second = host.engine().run_simple(&plan, &mut records).unwrap();

        assert!(second.is_success());
        assert_eq!(
            host.actions(),
            vec![
                "install-package:s3",
                "install-package:s4",
                "install-package:s5"
            ]
        );
        // Steps 1 and 2 are trusted from the records, not even probed
        assert!(!host.probes().iter().any(|p| p == "install-package:s1"));
        assert!(!host.probes().iter().any(|p| p == "install-package:s2"));
        assert!(second.step("install-package:s1").unwrap().resumed);
        assert_eq!(records.get("install-package:s3").unwrap().attempts, 2);
    }

    #[test]
    fn test_running_record_is_reattempted() {
        let host = FakeHost::new();
        let plan = chain(1);
        let mut records: RecordSet = serde_json::from_value(serde_json::json!({
            "plan_hash": "h",
            "records": {
                "install-package:s1": { "step_id": "install-package:s1", "status": "running", "attempts": 1 }
            }
        }))
        .unwrap();

        let result = host.engine().run_simple(&plan, &mut records).unwrap();
        assert!(result.is_success());
        assert_eq!(host.actions(), vec!["install-package:s1"]);
    }

    #[test]
    fn test_cyclic_plan_executes_nothing() {
        let host = FakeHost::new();
        let plan: Plan = vec![
            StepDescriptor::package(PackageSpec::new("a")).depends_on("install-package:b"),
            StepDescriptor::package(PackageSpec::new("b")).depends_on("install-package:a"),
        ]
        .into_iter()
        .collect();
        let mut records = RecordSet::new("h");

        let result = host.engine().run_simple(&plan, &mut records).unwrap();

        assert_eq!(result.status, RunStatus::ValidationError);
        assert_eq!(result.exit_code(), 2);
        assert!(result.steps.is_empty());
        assert!(result.error.unwrap().contains("cycle"));
        assert!(host.actions().is_empty());
        assert!(host.probes().is_empty());
        assert!(records.is_empty());
    }

    #[test]
    fn test_file_write_is_not_retried() {
        let host = FakeHost::new();
        host.fail("/etc/mesos/zk", StepError::transient("busy"), 3);
        let plan: Plan = vec![StepDescriptor::file(FileSpec::new("/etc/mesos/zk", "x", 0o644))]
            .into_iter()
            .collect();
        let mut records = RecordSet::for_plan("h", &plan);

        let result = host.engine().run_simple(&plan, &mut records).unwrap();
        let report = result.step("write-file:/etc/mesos/zk").unwrap();
        assert_eq!(report.status, StepStatus::Failed);
        assert_eq!(report.attempts, 1);
    }

    #[test]
    fn test_probe_error_forces_attempt() {
        let host = FakeHost::new();
        let plan = chain(1);
        host.engine()
            .run_simple(&plan, &mut RecordSet::for_plan("h", &plan))
            .unwrap();
        host.clear_log();

        // Installed already, but the first probe cannot tell
        host.probe_error("install-package:s1");
        let result = host
            .engine()
            .run_simple(&plan, &mut RecordSet::for_plan("h", &plan))
            .unwrap();

        assert_eq!(host.actions(), vec!["install-package:s1"]);
        // The confirming probe fails as well, so the step cannot be confirmed
        assert_eq!(
            result.step("install-package:s1").unwrap().status,
            StepStatus::Failed
        );
    }

    #[test]
    fn test_non_convergence_fails_step() {
        let host = FakeHost::new();
        host.inert("mesos-slave");
        let plan: Plan = vec![StepDescriptor::service(ServiceSpec::started("mesos-slave"))]
            .into_iter()
            .collect();

        let result = host
            .engine()
            .run_simple(&plan, &mut RecordSet::for_plan("h", &plan))
            .unwrap();
        let report = result.step("service:mesos-slave").unwrap();
        assert_eq!(report.status, StepStatus::Failed);
        assert!(report.error.as_deref().unwrap().contains("did not converge"));
    }

    #[test]
    fn test_cancellation_before_run() {
        let host = FakeHost::new();
        let flag = AtomicBool::new(true);
        let plan = chain(3);

        let result = host
            .engine()
            .with_cancel_flag(&flag)
            .run_simple(&plan, &mut RecordSet::for_plan("h", &plan))
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.status, RunStatus::PartialFailure);
        assert_eq!(result.count(StepStatus::Pending), 3);
        assert!(host.actions().is_empty());
    }

    #[test]
    fn test_cancellation_mid_run_keeps_completed_steps() {
        struct CancelAfterFirst<'f>(&'f AtomicBool);

        impl StepObserver for CancelAfterFirst<'_> {
            fn on_step_start(&mut self, _: usize, _: usize, _: &StepDescriptor) {}
            fn on_retry(&mut self, _: &StepDescriptor, _: u32, _: &StepError, _: Duration) {}
            fn on_step_complete(&mut self, _: &StepDescriptor, _: &ExecutionRecord) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let host = FakeHost::new();
        let flag = AtomicBool::new(false);
        let plan = chain(3);
        let mut records = RecordSet::for_plan("h", &plan);

        let result = host
            .engine()
            .with_cancel_flag(&flag)
            .run(&plan, &mut records, &mut NoPersist, &mut CancelAfterFirst(&flag))
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(host.actions(), vec!["install-package:s1"]);
        assert_eq!(records.status("install-package:s1"), StepStatus::Satisfied);
        assert_eq!(records.status("install-package:s2"), StepStatus::Pending);
    }

    #[test]
    fn test_records_persisted_on_every_transition() {
        let host = FakeHost::new();
        let plan = chain(2);
        let mut records = RecordSet::for_plan("h", &plan);
        let mut sink = CountingSink {
            persisted: 0,
            fail: false,
        };

        host.engine()
            .run(&plan, &mut records, &mut sink, &mut NoObserver)
            .unwrap();

        // Running + Satisfied for each of the two steps
        assert_eq!(sink.persisted, 4);
    }

    #[test]
    fn test_persistence_failure_aborts_run() {
        let host = FakeHost::new();
        let plan = chain(2);
        let mut sink = CountingSink {
            persisted: 0,
            fail: true,
        };

        let result = host.engine().run(
            &plan,
            &mut RecordSet::for_plan("h", &plan),
            &mut sink,
            &mut NoObserver,
        );

        assert!(result.is_err());
        // Nothing executed: the Running transition could not be recorded
        assert!(host.actions().is_empty());
    }

    #[test]
    fn test_observer_sees_retries() {
        struct RetryCounter<'c>(&'c Cell<u32>);

        impl StepObserver for RetryCounter<'_> {
            fn on_step_start(&mut self, _: usize, _: usize, _: &StepDescriptor) {}
            fn on_retry(&mut self, _: &StepDescriptor, _: u32, _: &StepError, _: Duration) {
                self.0.set(self.0.get() + 1);
            }
            fn on_step_complete(&mut self, _: &StepDescriptor, _: &ExecutionRecord) {}
        }

        let host = FakeHost::new();
        host.fail("s1", StepError::transient("mirror sync"), 2);
        let plan = chain(1);
        let retries = Cell::new(0);

        let result = host
            .engine()
            .run(
                &plan,
                &mut RecordSet::for_plan("h", &plan),
                &mut NoPersist,
                &mut RetryCounter(&retries),
            )
            .unwrap();

        assert!(result.is_success());
        assert_eq!(retries.get(), 2);
        assert_eq!(result.step("install-package:s1").unwrap().attempts, 3);
    }
}
