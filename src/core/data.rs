//! Work payload threaded through every processing step.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Where a captured failure came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureOrigin {
    /// The state's processing step failed
    Step,
    /// A before or after execution hook failed
    Hook,
    /// A fork branch never reported back before the coordinator gave up on it
    BranchTimeout,
}

/// Record of a failure captured while processing a state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// State that was executing when the failure happened
    pub state: String,
    /// Rendered error message
    pub message: String,
    /// What failed
    pub origin: FailureOrigin,
}

impl ExceptionInfo {
    pub fn new(state: impl Into<String>, message: impl Into<String>, origin: FailureOrigin) -> Self {
        Self {
            state: state.into(),
            message: message.into(),
            origin,
        }
    }

    /// Whether the failure came from an execution hook.
    pub fn is_on_hook(&self) -> bool {
        self.origin == FailureOrigin::Hook
    }
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} failure in '{}': {}", self.origin, self.state, self.message)
    }
}

/// Bag of named values passed to every processing step.
///
/// Besides the values themselves the payload carries the next-state
/// directive a step may set, and every failure captured so far. The
/// directive is transient and never serialized.
///
/// # Example
///
/// ```rust
/// use forkstate::core::ProcessingData;
///
/// let mut data = ProcessingData::new();
/// data.set("value", 4);
/// assert_eq!(data.get_i64("value"), Some(4));
///
/// let json = data.to_json().unwrap();
/// let restored = ProcessingData::from_json(&json).unwrap();
/// assert_eq!(restored.get_i64("value"), Some(4));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingData {
    values: BTreeMap<String, Value>,
    #[serde(skip)]
    next_state: Option<String>,
    #[serde(default)]
    exceptions: Vec<ExceptionInfo>,
}

impl ProcessingData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Store any serializable value under `key`.
    pub fn set_serialized<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.values.insert(key.into(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Read a value back into a concrete type.
    ///
    /// Returns `None` when the key is absent or the value has a different shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Direct the engine to `state` once the current step completes.
    pub fn set_next_state(&mut self, state: impl Into<String>) {
        self.next_state = Some(state.into());
    }

    pub fn next_state(&self) -> Option<&str> {
        self.next_state.as_deref()
    }

    pub(crate) fn clear_next_state(&mut self) {
        self.next_state = None;
    }

    pub fn add_exception(&mut self, info: ExceptionInfo) {
        self.exceptions.push(info);
    }

    pub fn exceptions(&self) -> &[ExceptionInfo] {
        &self.exceptions
    }

    pub fn has_exceptions(&self) -> bool {
        !self.exceptions.is_empty()
    }

    /// First captured failure, which is the only one outside of forks.
    pub fn first_exception(&self) -> Option<&ExceptionInfo> {
        self.exceptions.first()
    }

    /// Merge another payload into this one.
    ///
    /// Values from `other` override values under the same key. Failures
    /// from `other` are appended unless an identical record is already present.
    pub fn merge_from(&mut self, other: &ProcessingData) {
        self.values
            .extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));

        for info in &other.exceptions {
            if !self.exceptions.contains(info) {
                self.exceptions.push(info.clone());
            }
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl fmt::Display for ProcessingData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.values {
            write!(f, "{key}->{value}, ")?;
        }
        Ok(())
    }
}
