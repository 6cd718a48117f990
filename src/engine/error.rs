//! Engine error types.

use crate::snapshot::SnapshotError;
use crate::split::StoreError;
use thiserror::Error;

/// Errors returned by machine entry points.
///
/// Failures of processing steps and hooks never show up here; they are
/// captured on the payload and handled by the exception policy.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("State machine not started")]
    NotStarted,

    #[error("State machine already started")]
    AlreadyStarted,

    #[error("State '{0}' is not declared")]
    UnknownState(String),

    #[error("No transition found for event '{event}' in the current state '{state}'")]
    NoSuchTransition { state: String, event: String },

    #[error("Next state after '{0}' is ambiguous. The processing step must specify it")]
    AmbiguousTransition(String),

    #[error("State machine is not paused on a state waiting for an event")]
    NotPaused,

    /// The machine reached a final state or was terminated
    #[error("State machine has concluded")]
    Concluded,

    #[error("State machine must finish to have a final state")]
    NotConcluded,

    #[error("State machine was terminated and has no final state")]
    Terminated,

    #[error("State '{0}' forks but no split handler is registered")]
    NoSplitHandler(String),

    #[error("'{transition}' is not a split transition of state '{state}'")]
    InvalidSplitTransition { state: String, transition: String },

    /// Every branch of a fork reported back but none completed the join
    #[error("Fork from state '{0}' ended without completing its join")]
    JoinIncomplete(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl EngineError {
    /// Whether the error stems from how the machine was declared rather than
    /// from how it was driven.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownState(_)
                | Self::AmbiguousTransition(_)
                | Self::NoSplitHandler(_)
                | Self::InvalidSplitTransition { .. }
        )
    }
}
