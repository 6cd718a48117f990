//! Builder for constructing machines.

use crate::builder::error::BuildError;
use crate::core::{ExecutionHooks, ProcessingStep, StateNode, AUTO};
use crate::engine::{Machine, MachineDefinition};
use crate::split::SplitHandler;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builder for machines with a fluent API.
///
/// Transition methods (`on`, `auto`, `conditional`, `split`, `join`) apply
/// to the most recently declared state. Declaration mistakes are collected
/// as they happen and the first one is returned by [`build`](Self::build).
///
/// # Example
///
/// ```rust
/// use forkstate::builder::MachineBuilder;
/// use forkstate::core::{FnStep, NoopStep, StepContext};
///
/// let machine = MachineBuilder::new()
///     .with_name("orders")
///     .state("START", FnStep::new("Route", |ctx: &mut StepContext<'_>| {
///         let odd = ctx.get_i64("value").unwrap_or_default() % 2 != 0;
///         ctx.next_state(if odd { "ODD" } else { "EVEN" });
///         Ok(())
///     }))
///     .conditional("ODD")
///     .conditional("EVEN")
///     .final_state("ODD", NoopStep)
///     .final_state("EVEN", NoopStep)
///     .build()
///     .unwrap();
///
/// assert_eq!(machine.name(), Some("orders"));
/// assert_eq!(machine.state("START").unwrap().target("START_TO_ODD"), Some("ODD"));
/// ```
pub struct MachineBuilder {
    states: BTreeMap<String, StateNode>,
    current: Option<String>,
    joins: Vec<String>,
    final_states: Vec<String>,
    exception_state: Option<String>,
    hooks: Option<Arc<dyn ExecutionHooks>>,
    terminate_on_hook_error: bool,
    trace: bool,
    name: Option<String>,
    split_handler: Option<Arc<dyn SplitHandler>>,
    error: Option<BuildError>,
}

impl MachineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            states: BTreeMap::new(),
            current: None,
            joins: Vec::new(),
            final_states: Vec::new(),
            exception_state: None,
            hooks: None,
            terminate_on_hook_error: false,
            trace: false,
            name: None,
            split_handler: None,
            error: None,
        }
    }

    /// Declare a state.
    pub fn state<P>(self, name: impl Into<String>, step: P) -> Self
    where
        P: ProcessingStep + 'static,
    {
        self.declare(name.into(), Arc::new(step), false)
    }

    /// Declare a state after which the machine pauses until an event is triggered.
    pub fn waiting_state<P>(self, name: impl Into<String>, step: P) -> Self
    where
        P: ProcessingStep + 'static,
    {
        self.declare(name.into(), Arc::new(step), true)
    }

    /// Declare a state and mark it final.
    pub fn final_state<P>(self, name: impl Into<String>, step: P) -> Self
    where
        P: ProcessingStep + 'static,
    {
        let name = name.into();
        let mut builder = self.declare(name.clone(), Arc::new(step), false);
        if !builder.final_states.contains(&name) {
            builder.final_states.push(name);
        }
        builder
    }

    /// Leave the current state for `target` when `event` is triggered or
    /// directed.
    pub fn on(self, event: impl Into<String>, target: impl Into<String>) -> Self {
        self.add_transition(event.into(), target.into(), false)
    }

    /// Leave the current state for `target` unconditionally.
    pub fn auto(self, target: impl Into<String>) -> Self {
        self.add_transition(AUTO.to_string(), target.into(), false)
    }

    /// Allow the current state's step to direct the machine to `target`.
    ///
    /// The event is named `<STATE>_TO_<TARGET>`.
    pub fn conditional(self, target: impl Into<String>) -> Self {
        let target = target.into();
        match self.current.clone() {
            Some(state) => self.add_transition(format!("{state}_TO_{target}"), target, false),
            None => self.add_transition(format!("TO_{target}"), target, false),
        }
    }

    /// Fork from the current state into a branch starting at `target`.
    ///
    /// The event is named `SPLIT_<TARGET>`.
    pub fn split(self, target: impl Into<String>) -> Self {
        let target = target.into();
        self.add_transition(format!("SPLIT_{target}"), target, true)
    }

    /// Join the current fork branch into `target`.
    ///
    /// The event is named `<STATE>_TO_<TARGET>` and `target` is marked as
    /// a joining state.
    pub fn join(mut self, target: impl Into<String>) -> Self {
        let target = target.into();
        self.joins.push(target.clone());
        self.conditional(target)
    }

    /// Route failures to `state`. The state becomes a final state.
    pub fn on_exception_go_to(mut self, state: impl Into<String>) -> Self {
        self.exception_state = Some(state.into());
        self
    }

    /// Terminate the machine when an execution hook fails instead of routing
    /// to the exception state.
    pub fn terminate_on_hook_error(mut self) -> Self {
        self.terminate_on_hook_error = true;
        self
    }

    pub fn with_hooks<H>(mut self, hooks: H) -> Self
    where
        H: ExecutionHooks + 'static,
    {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Enable trace mode.
    pub fn with_trace(mut self) -> Self {
        self.trace = true;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn split_handler<H>(mut self, handler: H) -> Self
    where
        H: SplitHandler + 'static,
    {
        self.split_handler = Some(Arc::new(handler));
        self
    }

    /// Validate the declarations and build the machine.
    pub fn build(self) -> Result<Machine, BuildError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.states.is_empty() {
            return Err(BuildError::NoStates);
        }

        let mut states = self.states;
        for state in states.values() {
            for t in state.transitions() {
                if !states.contains_key(&t.target) {
                    return Err(BuildError::UnknownTarget {
                        state: state.name().to_string(),
                        event: t.event.clone(),
                        target: t.target.clone(),
                    });
                }
            }
        }

        let mut final_states = self.final_states;
        if let Some(exception_state) = &self.exception_state {
            if !states.contains_key(exception_state) {
                return Err(BuildError::UnknownExceptionState(exception_state.clone()));
            }
            if !final_states.contains(exception_state) {
                final_states.push(exception_state.clone());
            }
        }

        let mut joins = self.joins;
        joins.extend(validate_forks(&states)?);
        for join in &joins {
            if let Some(state) = states.get_mut(join) {
                state.make_joining();
            }
        }

        let definition = MachineDefinition {
            states,
            final_states,
            exception_state: self.exception_state,
            hooks: self.hooks,
            terminate_on_hook_error: self.terminate_on_hook_error,
        };

        Ok(Machine::new(
            Arc::new(definition),
            self.name,
            self.trace,
            self.split_handler,
        ))
    }

    fn declare(mut self, name: String, step: Arc<dyn ProcessingStep>, wait: bool) -> Self {
        if self.states.contains_key(&name) {
            self.current = None;
            return self.fail(BuildError::DuplicateState(name));
        }
        self.states
            .insert(name.clone(), StateNode::new(name.clone(), step, wait));
        self.current = Some(name);
        self
    }

    fn add_transition(mut self, event: String, target: String, split: bool) -> Self {
        let Some(state) = self.current.clone() else {
            return self.fail(BuildError::TransitionWithoutState { event });
        };
        let added = self
            .states
            .get_mut(&state)
            .is_some_and(|node| node.add_transition(event.clone(), target, split));
        if !added {
            return self.fail(BuildError::DuplicateTransition { state, event });
        }
        self
    }

    fn fail(mut self, error: BuildError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }
}

impl Default for MachineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Check every fork is well formed and return the states they join into.
fn validate_forks(states: &BTreeMap<String, StateNode>) -> Result<Vec<String>, BuildError> {
    let mut joins = Vec::new();

    for fork in states.values().filter(|s| s.is_fork_source()) {
        if fork.waits_for_event() {
            return Err(BuildError::InvalidFork {
                fork: fork.name().to_string(),
                reason: "a fork source cannot wait for an event",
            });
        }

        let mut join: Option<&str> = None;
        for t in fork.transitions().iter().filter(|t| t.split) {
            let branch = states
                .get(&t.target)
                .ok_or_else(|| BuildError::UnknownTarget {
                    state: fork.name().to_string(),
                    event: t.event.clone(),
                    target: t.target.clone(),
                })?;

            let invalid = |reason| BuildError::InvalidBranch {
                fork: fork.name().to_string(),
                branch: branch.name().to_string(),
                reason,
            };
            if branch.waits_for_event() {
                return Err(invalid("a branch cannot wait for an event"));
            }
            if branch.is_fork_source() {
                return Err(invalid("a branch cannot fork again"));
            }
            let [edge] = branch.transitions() else {
                return Err(invalid("a branch must declare exactly one transition, its join"));
            };

            match join {
                None => join = Some(edge.target.as_str()),
                Some(target) if target != edge.target => {
                    return Err(BuildError::MismatchedJoin {
                        fork: fork.name().to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        if let Some(target) = join {
            joins.push(target.to_string());
        }
    }

    Ok(joins)
}
