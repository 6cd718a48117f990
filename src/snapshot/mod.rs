//! Export and import of machine progress.
//!
//! A snapshot captures everything a machine changes while running and
//! nothing it was built with. The state table, steps, hooks and split
//! handler stay with the definition, so a snapshot can only be imported
//! into a machine built from the same declarations.
//!
//! Snapshots are how a branch running elsewhere learns the shared
//! machine's progress, and how a stopped machine resumes.

use crate::core::Trace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub mod error;

pub use error::SnapshotError;

/// Version identifier for the snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable capture of a machine's progress.
///
/// # Example
///
/// ```rust
/// use forkstate::builder::MachineBuilder;
/// use forkstate::core::{NoopStep, ProcessingData};
///
/// let build = || {
///     MachineBuilder::new()
///         .waiting_state("REVIEW", NoopStep)
///         .on("approve", "DONE")
///         .final_state("DONE", NoopStep)
///         .build()
///         .unwrap()
/// };
///
/// let mut machine = build();
/// let mut data = ProcessingData::new();
/// machine.start("REVIEW", &mut data).unwrap();
///
/// let json = machine.export_json().unwrap();
///
/// let mut resumed = build();
/// resumed.import_json(&json).unwrap();
/// resumed.trigger_event("approve", &mut data).unwrap();
/// assert!(resumed.has_reached_final_state());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version
    pub version: u32,

    /// Identity of the machine the snapshot was taken from
    pub machine_id: Uuid,

    /// Optional display name of the machine
    pub name: Option<String>,

    /// Current state; `None` before start or after termination
    pub current_state: Option<String>,

    /// Whether the machine was started
    pub started: bool,

    /// Complete trace, including its trace mode
    pub trace: Trace,

    /// Branches of the outstanding fork already completed
    pub completed_split_states: BTreeSet<String>,

    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Check the snapshot is internally consistent.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            });
        }

        if let (false, Some(state)) = (self.started, &self.current_state) {
            return Err(SnapshotError::StateBeforeStart(state.clone()));
        }

        if self.current_state.is_none() && !self.completed_split_states.is_empty() {
            return Err(SnapshotError::BranchesWithoutSource);
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Pretty-printed JSON, handy for inspection.
    pub fn to_json_pretty(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Compact binary encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::serialize(self).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = bincode::deserialize(bytes)
            .map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}
