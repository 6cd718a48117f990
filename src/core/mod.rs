//! Core building blocks of a machine.
//!
//! This module contains the pieces every machine is assembled from:
//! - States and their transition tables
//! - The work payload threaded through processing steps
//! - Capability traits for processing steps and execution hooks
//! - The execution trace carried in snapshots
//!
//! Nothing in here drives execution; that is the job of [`crate::engine`].

mod data;
mod state;
mod step;
mod trace;

pub use data::{ExceptionInfo, FailureOrigin, ProcessingData};
pub use state::{StateNode, Transition, AUTO};
pub use step::{ExecutionHooks, FnStep, NoopStep, ProcessingStep, StepContext, StepError};
pub use trace::{LogEntry, Trace};
