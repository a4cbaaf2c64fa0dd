//! # Converge
//!
//! An idempotent step engine for bringing a machine to a declared state.
//!
//! A [`Plan`] is an ordered list of [`StepDescriptor`]s forming a dependency
//! DAG. The [`ExecutionEngine`] walks the plan in dependency order, probing
//! each step before acting and confirming it afterwards, so running the same
//! plan twice against a converged machine changes nothing.
//!
//! ## Core Concepts
//!
//! - **Step**: One idempotent action (install a package, register a
//!   repository, write a file, control a service)
//! - **Plan**: Steps plus their dependencies, validated as a DAG
//! - **RecordSet**: Per-step status persisted after every transition, so an
//!   interrupted run resumes where it stopped
//! - **Preview**: A read-only dry run of a plan
//!
//! ## Example
//!
//! ```ignore
//! use converge::{ExecutionEngine, Plan, RecordSet, StepDescriptor, PackageSpec};
//!
//! let mut plan = Plan::new();
//! plan.push(StepDescriptor::package(PackageSpec::new("mesos")));
//!
//! let engine = ExecutionEngine::new(&probe, actions);
//! let mut records = RecordSet::for_plan("identity", &plan);
//! let result = engine.run_simple(&plan, &mut records)?;
//! assert!(result.is_success());
//! ```
//!
//! ## Collaborator Traits
//!
//! The engine never touches the machine directly:
//!
//! - [`SystemProbe`]: Read-only checks of current state
//! - [`PackageInstaller`], [`FileWriter`], [`ServiceManager`]: Step actions
//! - [`RecordSink`]: Durable record storage
//! - [`StepObserver`]: Progress updates

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod planner;
pub mod record;
pub mod retry;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types at crate root
pub use context::{
    Actions, FileWriter, NoObserver, PackageInstaller, ServiceManager, ServiceStatus,
    StepObserver, SystemProbe,
};
pub use diff::{Preview, PreviewSummary, ProbeState, StepPreview, preview};
pub use error::{StepError, ValidationError};
pub use executor::{ExecutionEngine, RunResult, RunStatus, StepReport};
pub use planner::Plan;
pub use record::{ExecutionRecord, NoPersist, RecordSet, RecordSink, StepStatus};
pub use retry::{RetryOutcome, RetryPolicy, with_retry};
pub use types::{
    FileSpec, PackageSpec, RepositorySpec, ServiceSpec, StepDescriptor, StepKind, StepPayload,
};
