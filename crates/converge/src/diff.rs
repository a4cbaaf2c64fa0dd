//! Dry-run preview: what a run would do, without doing it

use crate::context::SystemProbe;
use crate::error::ValidationError;
use crate::planner::Plan;
use crate::record::{RecordSet, StepStatus};
use crate::types::{StepDescriptor, StepKind};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Probe result for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ProbeState {
    /// Already in the desired state; a run would skip it
    Satisfied,
    /// Satisfied in the records of a previous run; would not be probed
    Recorded,
    /// Not in the desired state; a run would act
    Pending,
    /// The probe failed; a run would attempt the step
    Unknown(String),
}

impl ProbeState {
    /// Whether a run would execute an action for this step
    pub fn needs_action(&self) -> bool {
        matches!(self, Self::Pending | Self::Unknown(_))
    }
}

/// What a run would do for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPreview {
    pub step_id: String,
    pub kind: StepKind,
    pub description: String,
    pub state: ProbeState,
    /// Dependencies that a run would still have to act on first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waits_on: Vec<String>,
}

/// Preview of a whole plan, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub steps: Vec<StepPreview>,
}

impl Preview {
    pub fn summary(&self) -> PreviewSummary {
        let mut summary = PreviewSummary::default();
        for step in &self.steps {
            match step.state {
                ProbeState::Satisfied | ProbeState::Recorded => summary.satisfied += 1,
                ProbeState::Pending => summary.pending += 1,
                ProbeState::Unknown(_) => summary.unknown += 1,
            }
        }
        summary
    }

    /// Steps a run would act on
    pub fn changes(&self) -> impl Iterator<Item = &StepPreview> {
        self.steps.iter().filter(|s| s.state.needs_action())
    }
}

/// Preview summary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSummary {
    pub satisfied: usize,
    pub pending: usize,
    pub unknown: usize,
}

impl PreviewSummary {
    /// Number of steps a run would act on
    pub fn changes(&self) -> usize {
        self.pending + self.unknown
    }

    pub fn has_changes(&self) -> bool {
        self.changes() > 0
    }
}

/// Probe every step of `plan` and report what a run would do.
///
/// Probes are read-only, so they run in parallel. Steps recorded as Satisfied
/// in `records` are reported without probing, as a resumed run would treat them.
pub fn preview(
    plan: &Plan,
    probe: &dyn SystemProbe,
    records: Option<&RecordSet>,
) -> Result<Preview, ValidationError> {
    let order = plan.topological_order()?;

    let states: Vec<ProbeState> = order
        .par_iter()
        .map(|step| probe_state(step, probe, records))
        .collect();

    let mut steps: Vec<StepPreview> = Vec::with_capacity(order.len());
    for (step, state) in order.iter().zip(states) {
        let waits_on = step
            .depends_on
            .iter()
            .filter(|dep| {
                steps
                    .iter()
                    .find(|s| &s.step_id == *dep)
                    .is_some_and(|s| s.state.needs_action())
            })
            .cloned()
            .collect();

        steps.push(StepPreview {
            step_id: step.id.clone(),
            kind: step.kind(),
            description: step.description(),
            state,
            waits_on,
        });
    }

    Ok(Preview { steps })
}

fn probe_state(
    step: &StepDescriptor,
    probe: &dyn SystemProbe,
    records: Option<&RecordSet>,
) -> ProbeState {
    if records.is_some_and(|r| r.status(&step.id) == StepStatus::Satisfied) {
        return ProbeState::Recorded;
    }
    match probe.is_satisfied(step) {
        Ok(true) => ProbeState::Satisfied,
        Ok(false) => ProbeState::Pending,
        Err(e) => {
            log::debug!("Probe failed for {}: {}", step.id, e);
            ProbeState::Unknown(e.to_string())
        }
    }
}
