//! Build errors for machine declarations.

use thiserror::Error;

/// Errors that can occur when building a machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("At least one state must be defined")]
    NoStates,

    #[error("A state with the name '{0}' already exists")]
    DuplicateState(String),

    #[error("State '{state}' already has a transition for event '{event}'")]
    DuplicateTransition { state: String, event: String },

    #[error("Transition '{event}' declared before any state. Call .state(name, step) first")]
    TransitionWithoutState { event: String },

    #[error("Transition '{event}' from state '{state}' targets undeclared state '{target}'")]
    UnknownTarget {
        state: String,
        event: String,
        target: String,
    },

    #[error("Exception state '{0}' is not declared")]
    UnknownExceptionState(String),

    #[error("Fork from state '{fork}' is invalid: {reason}")]
    InvalidFork { fork: String, reason: &'static str },

    #[error("Branch '{branch}' of the fork from state '{fork}' is invalid: {reason}")]
    InvalidBranch {
        fork: String,
        branch: String,
        reason: &'static str,
    },

    #[error("Branches of the fork from state '{fork}' join different states")]
    MismatchedJoin { fork: String },
}
