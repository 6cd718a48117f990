//! States and their transition tables.
//!
//! A state couples a processing step with a table of named transitions. The
//! table is fixed once the machine is built; only the processing step can be
//! swapped afterwards.

use super::data::{ExceptionInfo, FailureOrigin, ProcessingData};
use super::step::{ExecutionHooks, ProcessingStep, StepContext};
use super::trace::Trace;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Reserved event name for unconditional progression.
pub const AUTO: &str = "AUTO";

/// Named edge from one state to another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Event that selects this transition
    pub event: String,
    /// Name of the target state
    pub target: String,
    /// Whether this transition launches a branch of a fork
    pub split: bool,
}

/// A named state in a machine.
pub struct StateNode {
    name: String,
    step: RwLock<Arc<dyn ProcessingStep>>,
    transitions: Vec<Transition>,
    wait_for_event: bool,
    joining: bool,
}

impl StateNode {
    pub(crate) fn new(
        name: impl Into<String>,
        step: Arc<dyn ProcessingStep>,
        wait_for_event: bool,
    ) -> Self {
        Self {
            name: name.into(),
            step: RwLock::new(step),
            transitions: Vec::new(),
            wait_for_event,
            joining: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current processing step.
    pub fn step(&self) -> Arc<dyn ProcessingStep> {
        self.step.read().clone()
    }

    /// Name of the current processing step.
    pub fn step_name(&self) -> String {
        self.step.read().name().to_string()
    }

    /// Replace the processing step bound to this state.
    ///
    /// Takes effect for every machine sharing this definition, starting with
    /// the next execution of the state.
    pub fn set_step<P>(&self, step: P)
    where
        P: ProcessingStep + 'static,
    {
        *self.step.write() = Arc::new(step);
    }

    /// Add a transition. Returns `false` when `event` is already declared.
    pub(crate) fn add_transition(
        &mut self,
        event: impl Into<String>,
        target: impl Into<String>,
        split: bool,
    ) -> bool {
        let event = event.into();
        if self.target(&event).is_some() {
            return false;
        }
        self.transitions.push(Transition {
            event,
            target: target.into(),
            split,
        });
        true
    }

    pub(crate) fn make_joining(&mut self) {
        self.joining = true;
    }

    /// All transitions in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Target state of the transition selected by `event`.
    pub fn target(&self, event: &str) -> Option<&str> {
        self.transitions
            .iter()
            .find(|t| t.event == event)
            .map(|t| t.target.as_str())
    }

    /// Events of the transitions that belong to this state's fork.
    pub fn split_transitions(&self) -> impl Iterator<Item = &str> {
        self.transitions
            .iter()
            .filter(|t| t.split)
            .map(|t| t.event.as_str())
    }

    pub fn is_fork_source(&self) -> bool {
        self.transitions.iter().any(|t| t.split)
    }

    /// Whether the machine pauses after this state until an event is triggered.
    pub fn waits_for_event(&self) -> bool {
        self.wait_for_event
    }

    /// Whether branches of some fork converge on this state.
    pub fn is_joining(&self) -> bool {
        self.joining
    }

    /// Run the before hook, the processing step and the after hook.
    ///
    /// Stops at the first failure and reports it instead of propagating it.
    pub(crate) fn execute(
        &self,
        data: &mut ProcessingData,
        trace: &mut Trace,
        hooks: Option<&dyn ExecutionHooks>,
    ) -> Option<ExceptionInfo> {
        let step = self.step();
        let step_name = step.name().to_string();

        if let Some(hooks) = hooks {
            trace.record(|| format!("Before execution hook: {step_name}"));
            if let Err(e) = hooks.before(self, data) {
                return Some(ExceptionInfo::new(&self.name, e.to_string(), FailureOrigin::Hook));
            }
        }

        trace.record(|| format!("Before processing: {step_name}"));
        let mut ctx = StepContext::new(&self.name, data);
        let outcome = step.process(&mut ctx);
        for entry in ctx.into_logs() {
            trace.push(entry);
        }

        if let Err(e) = outcome {
            trace.record(|| format!("Exception occurred in {step_name}.process()"));
            return Some(ExceptionInfo::new(&self.name, e.to_string(), FailureOrigin::Step));
        }
        trace.record(|| format!("After processing: {step_name}"));

        if let Some(hooks) = hooks {
            trace.record(|| format!("After execution hook: {step_name}"));
            if let Err(e) = hooks.after(self, data) {
                return Some(ExceptionInfo::new(&self.name, e.to_string(), FailureOrigin::Hook));
            }
        }

        None
    }
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("name", &self.name)
            .field("step", &self.step_name())
            .field("transitions", &self.transitions)
            .field("wait_for_event", &self.wait_for_event)
            .field("joining", &self.joining)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::step::{FnStep, NoopStep, StepError};
    use crate::core::trace::LogEntry;

    struct FailingBefore;

    impl ExecutionHooks for FailingBefore {
        fn before(&self, _state: &StateNode, _data: &mut ProcessingData) -> Result<(), StepError> {
            Err("before failed".into())
        }
    }

    struct FailingAfter;

    impl ExecutionHooks for FailingAfter {
        fn after(&self, _state: &StateNode, _data: &mut ProcessingData) -> Result<(), StepError> {
            Err("after failed".into())
        }
    }

    fn node(step: impl ProcessingStep + 'static) -> StateNode {
        StateNode::new("STEP", Arc::new(step), false)
    }

    #[test]
    fn duplicate_events_are_rejected() {
        let mut state = node(NoopStep);
        assert!(state.add_transition("EVENT1", "STATE2", false));
        assert!(!state.add_transition("EVENT1", "STATE3", false));
        assert_eq!(state.transitions().len(), 1);
        assert_eq!(state.target("EVENT1"), Some("STATE2"));
    }

    #[test]
    fn split_transitions_are_tracked() {
        let mut state = node(NoopStep);
        state.add_transition("SPLIT_A", "A", true);
        state.add_transition("SPLIT_B", "B", true);
        state.add_transition(AUTO, "C", false);

        assert!(state.is_fork_source());
        assert_eq!(state.split_transitions().collect::<Vec<_>>(), ["SPLIT_A", "SPLIT_B"]);
    }

    #[test]
    fn execute_reports_step_failure() {
        let state = node(FnStep::new("Boom", |_ctx: &mut StepContext<'_>| Err("boom".into())));
        let mut data = ProcessingData::new();
        let mut trace = Trace::enabled();

        let failure = state.execute(&mut data, &mut trace, None).unwrap();

        assert_eq!(failure.origin, FailureOrigin::Step);
        assert_eq!(failure.message, "boom");
        assert!(trace.messages().any(|m| m == "Exception occurred in Boom.process()"));
    }

    #[test]
    fn execute_reports_hook_failures() {
        let state = node(NoopStep);
        let mut data = ProcessingData::new();
        let mut trace = Trace::new();

        let before = state.execute(&mut data, &mut trace, Some(&FailingBefore as &dyn ExecutionHooks)).unwrap();
        let after = state.execute(&mut data, &mut trace, Some(&FailingAfter as &dyn ExecutionHooks)).unwrap();

        assert!(before.is_on_hook());
        assert_eq!(before.message, "before failed");
        assert!(after.is_on_hook());
    }

    #[test]
    fn step_logs_are_kept_without_trace_mode() {
        let state = node(FnStep::new("Logs", |ctx: &mut StepContext<'_>| {
            ctx.log("Processing Step 1");
            Ok(())
        }));
        let mut data = ProcessingData::new();
        let mut trace = Trace::new();

        assert!(state.execute(&mut data, &mut trace, None).is_none());
        assert_eq!(trace.messages().collect::<Vec<_>>(), ["Processing Step 1"]);
    }

    #[test]
    fn step_logs_are_appended_after_existing_entries() {
        let state = node(FnStep::new("Logs", |ctx: &mut StepContext<'_>| {
            ctx.log("tick");
            ctx.log("tock");
            Ok(())
        }));
        let at = chrono::Utc::now();
        let mut trace = Trace::new();
        trace.push(LogEntry::new(at, "earlier"));
        trace.push(LogEntry::new(at, "earlier"));
        let before = trace.entries().to_vec();

        state.execute(&mut ProcessingData::new(), &mut trace, None);

        assert_eq!(&trace.entries()[..2], before.as_slice());
        let appended: Vec<_> = trace.messages().skip(2).collect();
        assert_eq!(appended, ["tick", "tock"]);
    }

    #[test]
    fn step_can_be_swapped() {
        let state = node(NoopStep);
        state.set_step(FnStep::new("Replacement", |_ctx: &mut StepContext<'_>| Ok(())));
        assert_eq!(state.step_name(), "Replacement");
    }
}
