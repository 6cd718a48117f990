//! Execution engine.
//!
//! A [`Machine`] walks its [`MachineDefinition`] one state at a time:
//! execute the state, then either pause, fork, or resolve the next state.
//! Failures of processing steps and hooks are routed by the exception
//! policy; only configuration errors and API misuse surface as
//! [`EngineError`].

mod definition;
mod error;
mod machine;
mod policy;
mod resolve;

pub use definition::MachineDefinition;
pub use error::EngineError;
pub use machine::Machine;
