use crate::system::files::write_atomic;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use converge::{RecordSet, RecordSink};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// State Structures
// ============================================================================

/// Contents of the record file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RecordFile {
    /// Role of the profile that produced the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Last time the records were written
    pub last_updated: DateTime<Utc>,

    /// Per-step records, stamped with the profile content hash
    pub run: RecordSet,
}

impl RecordFile {
    pub fn new(role: Option<String>, run: RecordSet) -> Self {
        Self {
            role,
            last_updated: Utc::now(),
            run,
        }
    }

    pub fn plan_hash(&self) -> &str {
        self.run.plan_hash()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// `--resume` against records written for another profile
    #[error(
        "recorded run belongs to a different profile (recorded {recorded}, current {current}); \
         run without --resume or clear it with `nodeup state clear`"
    )]
    PlanMismatch { recorded: String, current: String },
}

/// Records to start a run from.
///
/// A fresh run starts from empty records. A resumed run starts from the
/// recorded ones, which must belong to the same profile.
pub fn starting_records(
    recorded: Option<RecordFile>,
    plan_hash: &str,
    resume: bool,
) -> Result<RecordSet, StateError> {
    match recorded {
        Some(file) if resume => {
            if file.plan_hash() != plan_hash {
                return Err(StateError::PlanMismatch {
                    recorded: short_hash(file.plan_hash()).to_string(),
                    current: short_hash(plan_hash).to_string(),
                });
            }
            log::info!(
                "Resuming run last updated {}",
                file.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
            );
            Ok(file.run)
        }
        None if resume => {
            log::info!("No recorded run to resume, starting fresh");
            Ok(RecordSet::new(plan_hash))
        }
        _ => Ok(RecordSet::new(plan_hash)),
    }
}

/// First 12 hex digits, for display
pub fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

// ============================================================================
// RecordStore
// ============================================================================

/// The record file on disk
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record file, or None if it doesn't exist
    pub fn load(&self) -> Result<Option<RecordFile>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("Record file does not exist: {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read record file: {}", self.path.display())
                });
            }
        };

        let file: RecordFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse record file: {}", self.path.display()))?;

        log::debug!("Loaded records from {}", self.path.display());
        Ok(Some(file))
    }

    /// Write the record file durably
    pub fn save(&self, file: &RecordFile) -> Result<()> {
        let content =
            toml::to_string_pretty(file).context("Failed to serialize records to TOML")?;

        write_atomic(&self.path, content.as_bytes(), 0o600)
            .with_context(|| format!("Failed to write record file: {}", self.path.display()))?;

        log::debug!("Saved records to {}", self.path.display());
        Ok(())
    }

    /// Remove the record file; false if there was none
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("Removed {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove record file: {}", self.path.display())
            }),
        }
    }
}

/// RecordSink writing through a [`RecordStore`]
pub struct FileSink {
    store: RecordStore,
    role: String,
}

impl FileSink {
    pub fn new(store: RecordStore, role: impl Into<String>) -> Self {
        Self {
            store,
            role: role.into(),
        }
    }
}

impl RecordSink for FileSink {
    fn persist(&mut self, records: &RecordSet) -> Result<()> {
        self.store
            .save(&RecordFile::new(Some(self.role.clone()), records.clone()))
    }
}
