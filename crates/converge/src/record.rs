//! Execution records - per-step status that survives a crash
//!
//! A [`RecordSet`] is stamped with the identity hash of the plan it belongs
//! to. Status transitions are made by the engine only; everything else reads.

use crate::planner::Plan;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Satisfied,
    Failed,
    /// Not attempted because a dependency did not reach Satisfied
    Blocked,
}

impl StepStatus {
    /// Whether the status is final for a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Satisfied | Self::Failed | Self::Blocked)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Satisfied => "satisfied",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        };
        write!(f, "{name}")
    }
}

/// Status of a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub step_id: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ExecutionRecord {
    pub fn pending(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Records for every step of one plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    plan_hash: String,
    #[serde(default)]
    records: BTreeMap<String, ExecutionRecord>,
}

impl RecordSet {
    /// Empty record set for the plan with the given identity hash
    pub fn new(plan_hash: impl Into<String>) -> Self {
        Self {
            plan_hash: plan_hash.into(),
            records: BTreeMap::new(),
        }
    }

    /// Pending records for every step of `plan`
    pub fn for_plan(plan_hash: impl Into<String>, plan: &Plan) -> Self {
        let mut set = Self::new(plan_hash);
        set.ensure(plan);
        set
    }

    pub fn plan_hash(&self) -> &str {
        &self.plan_hash
    }

    /// Add Pending records for plan steps that have none
    pub fn ensure(&mut self, plan: &Plan) {
        for step in plan.steps() {
            self.records
                .entry(step.id.clone())
                .or_insert_with(|| ExecutionRecord::pending(&step.id));
        }
    }

    pub fn get(&self, step_id: &str) -> Option<&ExecutionRecord> {
        self.records.get(step_id)
    }

    pub fn status(&self, step_id: &str) -> StepStatus {
        self.get(step_id).map(|r| r.status).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records with the given status
    pub fn count(&self, status: StepStatus) -> usize {
        self.records.values().filter(|r| r.status == status).count()
    }

    pub(crate) fn record_mut(&mut self, step_id: &str) -> &mut ExecutionRecord {
        self.records
            .entry(step_id.to_string())
            .or_insert_with(|| ExecutionRecord::pending(step_id))
    }
}

/// Durable storage for a record set
///
/// `persist` must not return until the records would survive a crash
/// (flushed to disk or equivalent).
pub trait RecordSink {
    fn persist(&mut self, records: &RecordSet) -> Result<()>;
}

/// Sink that keeps nothing (dry runs, tests)
pub struct NoPersist;

impl RecordSink for NoPersist {
    fn persist(&mut self, _records: &RecordSet) -> Result<()> {
        Ok(())
    }
}
