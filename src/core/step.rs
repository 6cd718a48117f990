//! Capabilities bound to states: processing steps and execution hooks.

use super::data::ProcessingData;
use super::state::StateNode;
use super::trace::LogEntry;
use std::ops::{Deref, DerefMut};

/// Error type returned by processing steps and hooks.
///
/// The engine only cares whether a step failed, so any error will do.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// View of the payload handed to a processing step.
///
/// Dereferences to [`ProcessingData`]; additionally collects log lines that
/// end up in the machine trace regardless of trace mode.
pub struct StepContext<'a> {
    state: &'a str,
    data: &'a mut ProcessingData,
    logs: Vec<LogEntry>,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(state: &'a str, data: &'a mut ProcessingData) -> Self {
        Self {
            state,
            data,
            logs: Vec::new(),
        }
    }

    /// Name of the state being processed.
    pub fn state_name(&self) -> &str {
        self.state
    }

    /// Direct the engine to `state` once this step completes.
    pub fn next_state(&mut self, state: impl Into<String>) {
        self.data.set_next_state(state);
    }

    /// Add a line to the machine trace.
    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(LogEntry::now(message));
    }

    pub(crate) fn into_logs(self) -> Vec<LogEntry> {
        self.logs
    }
}

impl Deref for StepContext<'_> {
    type Target = ProcessingData;

    fn deref(&self) -> &ProcessingData {
        self.data
    }
}

impl DerefMut for StepContext<'_> {
    fn deref_mut(&mut self) -> &mut ProcessingData {
        self.data
    }
}

/// Unit of work bound to a state.
///
/// # Example
///
/// ```rust
/// use forkstate::core::{ProcessingStep, StepContext, StepError};
///
/// struct Double;
///
/// impl ProcessingStep for Double {
///     fn process(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
///         let value = ctx.get_i64("value").ok_or("value missing")?;
///         ctx.set("value", value * 2);
///         ctx.log("doubled");
///         Ok(())
///     }
/// }
///
/// assert_eq!(Double.name(), "Double");
/// ```
pub trait ProcessingStep: Send + Sync {
    fn process(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError>;

    /// Short name used in trace messages. Defaults to the type name.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// A processing step built from a closure and a display name.
pub struct FnStep<F> {
    name: String,
    f: F,
}

impl<F> FnStep<F>
where
    F: Fn(&mut StepContext<'_>) -> Result<(), StepError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> ProcessingStep for FnStep<F>
where
    F: Fn(&mut StepContext<'_>) -> Result<(), StepError> + Send + Sync,
{
    fn process(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        (self.f)(ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A step that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStep;

impl ProcessingStep for NoopStep {
    fn process(&self, _ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        Ok(())
    }
}

/// Hooks run around every processing step.
///
/// A failing hook is reported separately from a failing step so machines can
/// choose to terminate on hook failures.
pub trait ExecutionHooks: Send + Sync {
    fn before(&self, _state: &StateNode, _data: &mut ProcessingData) -> Result<(), StepError> {
        Ok(())
    }

    fn after(&self, _state: &StateNode, _data: &mut ProcessingData) -> Result<(), StepError> {
        Ok(())
    }
}
