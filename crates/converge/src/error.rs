//! Error taxonomy for step execution
//!
//! Step-level failures never abort a run: they are captured into the step's
//! [`ExecutionRecord`](crate::record::ExecutionRecord). Only plan validation
//! errors stop a run before anything executes.

use thiserror::Error;

/// Failure of a single step action or probe
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// Network or package fetch failure, worth retrying
    #[error("transient: {0}")]
    Transient(String),

    /// Permission denied, invalid config, missing binary or unit
    #[error("{0}")]
    Permanent(String),

    /// Current state could not be determined
    #[error("probe failed: {0}")]
    Probe(String),
}

impl StepError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn probe(message: impl Into<String>) -> Self {
        Self::Probe(message.into())
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionAborted => Self::Transient(err.to_string()),
            _ => Self::Permanent(err.to_string()),
        }
    }
}

/// A malformed profile or plan, surfaced before any execution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },

    #[error("step {0} depends on itself")]
    SelfDependency(String),

    #[error("dependency cycle between steps: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidField { field: String, message: String },

    #[error("{0}")]
    Other(String),
}
