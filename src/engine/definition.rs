//! Frozen machine definition shared by a machine and all of its copies.

use crate::core::{ExecutionHooks, StateNode};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Structural part of a machine: the state table and the failure policy.
///
/// Produced by [`crate::builder::MachineBuilder`] and never serialized.
/// Machines created from the same definition (including branch copies made
/// during a fork) share it through an `Arc`.
pub struct MachineDefinition {
    pub(crate) states: BTreeMap<String, StateNode>,
    pub(crate) final_states: Vec<String>,
    pub(crate) exception_state: Option<String>,
    pub(crate) hooks: Option<Arc<dyn ExecutionHooks>>,
    pub(crate) terminate_on_hook_error: bool,
}

impl MachineDefinition {
    pub fn state(&self, name: &str) -> Option<&StateNode> {
        self.states.get(name)
    }

    /// All states ordered by name.
    pub fn states(&self) -> impl Iterator<Item = &StateNode> {
        self.states.values()
    }

    pub fn contains_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Final states in declaration order. Includes the exception state.
    pub fn final_states(&self) -> &[String] {
        &self.final_states
    }

    pub fn is_final(&self, name: &str) -> bool {
        self.final_states.iter().any(|s| s == name)
    }

    pub fn exception_state(&self) -> Option<&str> {
        self.exception_state.as_deref()
    }

    pub fn hooks(&self) -> Option<&dyn ExecutionHooks> {
        self.hooks.as_deref()
    }

    /// Whether a failing execution hook terminates the machine instead of
    /// routing it to the exception state.
    pub fn terminates_on_hook_error(&self) -> bool {
        self.terminate_on_hook_error
    }
}

impl fmt::Debug for MachineDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineDefinition")
            .field("states", &self.states.values().collect::<Vec<_>>())
            .field("final_states", &self.final_states)
            .field("exception_state", &self.exception_state)
            .field("hooks", &self.hooks.is_some())
            .field("terminate_on_hook_error", &self.terminate_on_hook_error)
            .finish()
    }
}
