//! Durable record of an outstanding fork round.
//!
//! Every branch of a fork reports through [`RoundStore::update`], which is
//! the only place the shared round record is modified. Implementations
//! must give the closure exclusive access to the record for its whole
//! duration, the way a row lock in a serializable transaction would.

use crate::core::ProcessingData;
use crate::snapshot::Snapshot;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Identifies one fork round: the machine and the state it forked from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundKey {
    pub machine_id: Uuid,
    pub source_state: String,
}

impl RoundKey {
    pub fn new(machine_id: Uuid, source_state: impl Into<String>) -> Self {
        Self {
            machine_id,
            source_state: source_state.into(),
        }
    }
}

impl fmt::Display for RoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.machine_id, self.source_state)
    }
}

/// Shared state of a round: the machine as the branches left it so far,
/// and the payload contributions merged so far.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub snapshot: Snapshot,
    pub data: ProcessingData,
}

impl RoundRecord {
    /// Record for a round that no branch has reported to yet.
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            data: ProcessingData::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(|e| StoreError::Backend(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::Backend(e.to_string()))
    }
}

/// Errors raised by round stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Fork round {0} is already open")]
    AlreadyOpen(RoundKey),

    #[error("Fork round {0} not found")]
    NotFound(RoundKey),

    /// Failure of the underlying storage
    #[error("Round store failure: {0}")]
    Backend(String),
}

/// Storage for fork rounds.
pub trait RoundStore: Send + Sync {
    /// Create the record for a new round.
    fn open(&self, key: RoundKey, record: RoundRecord) -> Result<(), StoreError>;

    /// Read-modify-write the round record as one exclusive unit.
    ///
    /// Changes made by `f` are kept only if it returns `Ok`.
    fn update<T, E, F>(&self, key: &RoundKey, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut RoundRecord) -> Result<T, E>,
        E: From<StoreError>;

    fn load(&self, key: &RoundKey) -> Result<RoundRecord, StoreError>;

    fn remove(&self, key: &RoundKey) -> Result<RoundRecord, StoreError>;
}

/// In-process round store guarded by a single mutex.
#[derive(Debug, Default)]
pub struct MemoryRoundStore {
    rounds: Mutex<HashMap<RoundKey, RoundRecord>>,
}

impl MemoryRoundStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rounds currently open.
    pub fn len(&self) -> usize {
        self.rounds.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.lock().is_empty()
    }
}

impl RoundStore for MemoryRoundStore {
    fn open(&self, key: RoundKey, record: RoundRecord) -> Result<(), StoreError> {
        let mut rounds = self.rounds.lock();
        if rounds.contains_key(&key) {
            return Err(StoreError::AlreadyOpen(key));
        }
        rounds.insert(key, record);
        Ok(())
    }

    fn update<T, E, F>(&self, key: &RoundKey, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut RoundRecord) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut rounds = self.rounds.lock();
        let record = rounds
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let mut draft = record.clone();
        let out = f(&mut draft)?;
        *record = draft;
        Ok(out)
    }

    fn load(&self, key: &RoundKey) -> Result<RoundRecord, StoreError> {
        self.rounds
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn remove(&self, key: &RoundKey) -> Result<RoundRecord, StoreError> {
        self.rounds
            .lock()
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }
}
