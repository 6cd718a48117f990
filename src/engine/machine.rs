//! Machine instances and the processing loop.

use super::definition::MachineDefinition;
use super::error::EngineError;
use super::policy::{self, FailureAction, TerminateReason};
use super::resolve;
use crate::core::{ExceptionInfo, ProcessingData, StateNode, Trace};
use crate::snapshot::{Snapshot, SnapshotError, SNAPSHOT_VERSION};
use crate::split::{RoundStatus, SplitHandler};
use chrono::Utc;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A running (or runnable) instance of a machine definition.
///
/// The machine owns only its mutable progress: the current state, the
/// started flag, the trace and, while a fork is outstanding, the branches
/// already completed. Everything structural lives in the shared
/// [`MachineDefinition`].
///
/// A started machine is in exactly one of three conditions:
/// - terminated: no current state
/// - finished: the current state is a final state
/// - paused: anything else, usually waiting for an event
///
/// # Example
///
/// ```rust
/// use forkstate::builder::MachineBuilder;
/// use forkstate::core::{FnStep, ProcessingData, StepContext};
///
/// let mut machine = MachineBuilder::new()
///     .state("START", FnStep::new("Start", |ctx: &mut StepContext<'_>| {
///         ctx.set("value", 4);
///         Ok(())
///     }))
///     .auto("END")
///     .final_state("END", FnStep::new("End", |_ctx: &mut StepContext<'_>| Ok(())))
///     .build()
///     .unwrap();
///
/// let mut data = ProcessingData::new();
/// machine.start("START", &mut data).unwrap();
///
/// assert!(machine.has_reached_final_state());
/// assert_eq!(machine.current_state(), Some("END"));
/// ```
pub struct Machine {
    id: Uuid,
    name: Option<String>,
    definition: Arc<MachineDefinition>,
    split_handler: Option<Arc<dyn SplitHandler>>,
    current_state: Option<String>,
    started: bool,
    trace: Trace,
    completed_split_states: BTreeSet<String>,
}

impl Machine {
    pub(crate) fn new(
        definition: Arc<MachineDefinition>,
        name: Option<String>,
        trace_enabled: bool,
        split_handler: Option<Arc<dyn SplitHandler>>,
    ) -> Self {
        let mut trace = Trace::new();
        trace.set_enabled(trace_enabled);
        Self {
            id: Uuid::new_v4(),
            name,
            definition,
            split_handler,
            current_state: None,
            started: false,
            trace,
            completed_split_states: BTreeSet::new(),
        }
    }

    /// Identity shared by this machine, its copies and its snapshots.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn definition(&self) -> &MachineDefinition {
        &self.definition
    }

    /// Look up a declared state.
    pub fn state(&self, name: &str) -> Option<&StateNode> {
        self.definition.state(name)
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn set_trace_enabled(&mut self, enabled: bool) {
        self.trace.set_enabled(enabled);
    }

    /// Name of the current state; `None` before start and after termination.
    pub fn current_state(&self) -> Option<&str> {
        self.current_state.as_deref()
    }

    /// Branches of the outstanding fork that already reported completion.
    pub fn completed_split_states(&self) -> &BTreeSet<String> {
        &self.completed_split_states
    }

    /// Record a completed fork branch. Returns `false` if it was already recorded.
    pub(crate) fn record_completed_split_state(&mut self, branch: impl Into<String>) -> bool {
        self.completed_split_states.insert(branch.into())
    }

    /// Merge another machine's trace into this one.
    pub fn merge_trace_from(&mut self, other: &Machine) {
        self.trace.merge(&other.trace);
    }

    pub fn set_split_handler<H>(&mut self, handler: H)
    where
        H: SplitHandler + 'static,
    {
        self.split_handler = Some(Arc::new(handler));
    }

    /// A fresh machine sharing this one's definition, identity, name and
    /// split handler, with no progress of its own.
    ///
    /// Importing a snapshot into the copy reproduces the original.
    pub fn empty_copy(&self) -> Machine {
        Machine {
            id: self.id,
            name: self.name.clone(),
            definition: Arc::clone(&self.definition),
            split_handler: self.split_handler.clone(),
            current_state: None,
            started: false,
            trace: Trace::new(),
            completed_split_states: BTreeSet::new(),
        }
    }

    /// Begin processing at `state`. Valid only once per machine.
    pub fn start(&mut self, state: &str, data: &mut ProcessingData) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        if !self.definition.contains_state(state) {
            return Err(EngineError::UnknownState(state.to_string()));
        }

        tracing::debug!(machine = %self.id, state, "Starting machine");
        self.started = true;
        self.process(state.to_string(), data)
    }

    /// Resume a machine paused on a wait state by following `event`.
    pub fn trigger_event(&mut self, event: &str, data: &mut ProcessingData) -> Result<(), EngineError> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        if self.is_concluded() {
            return Err(EngineError::Concluded);
        }
        if !self.is_paused() {
            return Err(EngineError::NotPaused);
        }

        let current = self.current_state.clone().ok_or(EngineError::Concluded)?;
        let target = self
            .definition
            .state(&current)
            .and_then(|s| s.target(event))
            .map(str::to_string)
            .ok_or_else(|| EngineError::NoSuchTransition {
                state: current.clone(),
                event: event.to_string(),
            })?;

        tracing::debug!(machine = %self.id, event, from = %current, to = %target, "Event triggered");
        self.trace
            .record(|| format!("triggerEvent, continuing to state: {target}"));
        self.process(target, data)
    }

    /// Run one fork branch of the current fork source state.
    ///
    /// Only the branch target state is executed. Its outcome is then
    /// reported to the split handler and, if this branch completed the
    /// round, the machine continues past the join.
    pub fn continue_on_split_state(
        &mut self,
        split_transition: &str,
        data: &mut ProcessingData,
    ) -> Result<RoundStatus, EngineError> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }

        let definition = Arc::clone(&self.definition);
        let source_name = self.current_state.clone().ok_or(EngineError::Concluded)?;
        let source = definition
            .state(&source_name)
            .ok_or_else(|| EngineError::UnknownState(source_name.clone()))?;

        let branch_name = source
            .transitions()
            .iter()
            .find(|t| t.split && t.event == split_transition)
            .map(|t| t.target.clone())
            .ok_or_else(|| EngineError::InvalidSplitTransition {
                state: source_name.clone(),
                transition: split_transition.to_string(),
            })?;
        let branch = definition
            .state(&branch_name)
            .ok_or_else(|| EngineError::UnknownState(branch_name.clone()))?;

        tracing::debug!(machine = %self.id, source = %source_name, branch = %branch_name, "Running fork branch");
        self.trace
            .record(|| format!("Entering split state: {branch_name}"));
        data.clear_next_state();

        if let Some(failure) = branch.execute(data, &mut self.trace, definition.hooks()) {
            tracing::warn!(machine = %self.id, branch = %branch_name, error = %failure.message, "Fork branch failed");
            data.add_exception(failure);
        }

        self.finish_split_branch(&source_name, &branch_name, data)
    }

    /// Report a finished fork branch to the split handler and continue past
    /// the join if the round is now complete.
    ///
    /// Coordinators call this directly to account for a branch that never
    /// reported back on its own.
    pub fn finish_split_branch(
        &mut self,
        source: &str,
        branch: &str,
        data: &mut ProcessingData,
    ) -> Result<RoundStatus, EngineError> {
        let handler = self
            .split_handler
            .clone()
            .ok_or_else(|| EngineError::NoSplitHandler(source.to_string()))?;

        let status = handler.get_and_update_state_and_data(self, data, source, branch)?;
        match status {
            RoundStatus::Complete => self.join(source, branch, data)?,
            RoundStatus::Pending => {
                tracing::debug!(machine = %self.id, source, branch, "Fork branch recorded, round pending");
            }
            RoundStatus::AlreadyRecorded => {
                tracing::warn!(machine = %self.id, source, branch, "Fork branch reported more than once");
            }
        }
        Ok(status)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether the machine waits for an event before it can go on.
    pub fn is_paused(&self) -> bool {
        self.started && self.current_node().is_some_and(StateNode::waits_for_event)
    }

    /// Reached a final state or was terminated.
    pub fn is_concluded(&self) -> bool {
        self.has_reached_final_state() || self.was_terminated()
    }

    pub fn has_reached_final_state(&self) -> bool {
        self.started
            && self
                .current_state
                .as_deref()
                .is_some_and(|s| self.definition.is_final(s))
    }

    pub fn was_terminated(&self) -> bool {
        self.started && self.current_state.is_none()
    }

    /// State the machine is paused on.
    pub fn paused_on_state(&self) -> Result<&StateNode, EngineError> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        if self.is_concluded() {
            return Err(EngineError::Concluded);
        }
        self.current_node().ok_or(EngineError::Concluded)
    }

    /// State the machine finished on.
    pub fn final_state(&self) -> Result<&StateNode, EngineError> {
        if !self.is_concluded() {
            return Err(EngineError::NotConcluded);
        }
        self.current_node().ok_or(EngineError::Terminated)
    }

    /// Capture the machine's progress.
    pub fn export(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            machine_id: self.id,
            name: self.name.clone(),
            current_state: self.current_state.clone(),
            started: self.started,
            trace: self.trace.clone(),
            completed_split_states: self.completed_split_states.clone(),
            taken_at: Utc::now(),
        }
    }

    /// Replace this machine's progress with the one captured in `snapshot`.
    ///
    /// The snapshot must come from a machine with the same definition; every
    /// state it names has to be declared here.
    pub fn import(&mut self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        snapshot.validate()?;

        let names = snapshot
            .current_state
            .iter()
            .chain(snapshot.completed_split_states.iter());
        for name in names {
            if !self.definition.contains_state(name) {
                return Err(SnapshotError::UndeclaredState(name.clone()));
            }
        }

        self.id = snapshot.machine_id;
        self.name = snapshot.name.clone();
        self.current_state = snapshot.current_state.clone();
        self.started = snapshot.started;
        self.trace = snapshot.trace.clone();
        self.completed_split_states = snapshot.completed_split_states.clone();
        Ok(())
    }

    pub fn export_json(&self) -> Result<String, SnapshotError> {
        self.export().to_json()
    }

    pub fn import_json(&mut self, json: &str) -> Result<(), SnapshotError> {
        let snapshot = Snapshot::from_json(json)?;
        self.import(&snapshot)
    }

    fn current_node(&self) -> Option<&StateNode> {
        self.current_state
            .as_deref()
            .and_then(|name| self.definition.state(name))
    }

    fn process(&mut self, start: String, data: &mut ProcessingData) -> Result<(), EngineError> {
        let definition = Arc::clone(&self.definition);
        let mut next = Some(start);

        while let Some(name) = next.take() {
            let state = definition
                .state(&name)
                .ok_or_else(|| EngineError::UnknownState(name.clone()))?;

            self.current_state = Some(name.clone());
            self.trace.record(|| format!("Entering state: {name}"));
            tracing::debug!(machine = %self.id, state = %name, "Entering state");
            data.clear_next_state();

            if let Some(failure) = state.execute(data, &mut self.trace, definition.hooks()) {
                data.add_exception(failure.clone());
                next = self.apply_failure_policy(&name, &failure);
                continue;
            }

            if state.waits_for_event() {
                self.trace.record(|| {
                    format!("Processed state {name}. Pausing because {name} requires a wait after completion")
                });
                tracing::debug!(machine = %self.id, state = %name, "Pausing for event");
                break;
            }

            if state.is_fork_source() {
                let handler = self
                    .split_handler
                    .clone()
                    .ok_or_else(|| EngineError::NoSplitHandler(name.clone()))?;
                let transitions: Vec<String> =
                    state.split_transitions().map(str::to_string).collect();

                self.trace.record(|| {
                    format!("Splitting from state {name} into {} branches", transitions.len())
                });
                tracing::debug!(machine = %self.id, state = %name, branches = transitions.len(), "Forking");
                handler.handle_split(self, data, &transitions)?;
                break;
            }

            next = resolve::next_state(state, data.next_state())?;
            self.trace.record(|| {
                format!(
                    "Exiting state: {name}, transitioning to: {}",
                    next.as_deref().unwrap_or("terminated")
                )
            });
        }

        Ok(())
    }

    fn join(&mut self, source: &str, branch: &str, data: &mut ProcessingData) -> Result<(), EngineError> {
        self.completed_split_states.clear();
        let definition = Arc::clone(&self.definition);

        let decisive = policy::decisive_failure(
            data.exceptions(),
            definition.terminates_on_hook_error(),
        )
        .cloned();
        if let Some(failure) = decisive {
            let count = data.exceptions().len();
            self.trace
                .record(|| format!("Had {count} exceptions after split"));
            return match self.apply_failure_policy(source, &failure) {
                Some(target) => self.process(target, data),
                None => Ok(()),
            };
        }

        let branch_node = definition
            .state(branch)
            .ok_or_else(|| EngineError::UnknownState(branch.to_string()))?;
        let target = resolve::join_target(branch_node)?;

        tracing::info!(machine = %self.id, source, join = %target, "Fork round complete");
        self.trace
            .record(|| format!("All split states completed, joining at state: {target}"));
        self.process(target, data)
    }

    /// Apply the exception policy. Returns the state to continue with, or
    /// `None` after terminating the machine.
    fn apply_failure_policy(&mut self, failing_state: &str, failure: &ExceptionInfo) -> Option<String> {
        let action = policy::on_failure(
            self.definition.exception_state(),
            self.definition.terminates_on_hook_error(),
            failing_state,
            failure,
        );

        match action {
            FailureAction::RouteTo(target) => {
                tracing::warn!(machine = %self.id, state = failing_state, to = %target, error = %failure.message, "Routing to exception state");
                self.trace
                    .record(|| format!("Due to exception transitioning to state {target}"));
                Some(target)
            }
            FailureAction::Terminate(reason) => {
                tracing::warn!(machine = %self.id, state = failing_state, error = %failure.message, "Terminating machine");
                if failure.is_on_hook() && reason == TerminateReason::NoExceptionState {
                    self.trace
                        .record(|| "Exception from an execution hook method".to_string());
                }
                self.trace.record(|| reason.describe().to_string());
                self.trace.record(|| failure.message.clone());
                self.current_state = None;
                None
            }
        }
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("current_state", &self.current_state)
            .field("started", &self.started)
            .field("completed_split_states", &self.completed_split_states)
            .field("split_handler", &self.split_handler.is_some())
            .finish()
    }
}
