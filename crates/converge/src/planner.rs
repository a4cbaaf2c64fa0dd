//! Plans - ordered step lists with a validated dependency DAG

use crate::error::ValidationError;
use crate::types::StepDescriptor;
use std::collections::{BTreeSet, HashMap, HashSet};

/// An ordered list of steps in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<StepDescriptor>,
}

impl Plan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step; validation happens later, as a whole
    pub fn push(&mut self, step: StepDescriptor) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn get(&self, id: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Step ids in declaration order
    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check ids are unique and the dependency relation is a DAG
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.topological_order().map(|_| ())
    }

    /// Steps ordered so every step follows its dependencies.
    ///
    /// Kahn's algorithm; among steps that are ready at the same time the one
    /// declared first wins, so the order is stable for a given plan.
    pub fn topological_order(&self) -> Result<Vec<&StepDescriptor>, ValidationError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(self.steps.len());
        for (i, step) in self.steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                return Err(ValidationError::MissingField("step id".to_string()));
            }
            if index.insert(step.id.as_str(), i).is_some() {
                return Err(ValidationError::DuplicateStep(step.id.clone()));
            }
        }

        let mut in_degree = vec![0usize; self.steps.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];

        for (i, step) in self.steps.iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(ValidationError::SelfDependency(step.id.clone()));
                }
                let Some(&d) = index.get(dep.as_str()) else {
                    return Err(ValidationError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                if seen.insert(d) {
                    in_degree[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.steps.len());

        while let Some(i) = ready.pop_first() {
            order.push(&self.steps[i]);
            for &next in &dependents[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < self.steps.len() {
            let cyclic = in_degree
                .iter()
                .enumerate()
                .filter(|(_, deg)| **deg > 0)
                .map(|(i, _)| self.steps[i].id.clone())
                .collect();
            return Err(ValidationError::Cycle(cyclic));
        }

        Ok(order)
    }
}

impl FromIterator<StepDescriptor> for Plan {
    fn from_iter<I: IntoIterator<Item = StepDescriptor>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}
