//! Next-state resolution.

use super::error::EngineError;
use crate::core::{StateNode, AUTO};

/// Pick the state that follows `state` after a successful execution.
///
/// Priority: the explicit directive, then the `AUTO` transition, then the
/// only declared transition. `Ok(None)` means the state has no way out and
/// the machine halts on it.
pub(crate) fn next_state(
    state: &StateNode,
    directive: Option<&str>,
) -> Result<Option<String>, EngineError> {
    if let Some(target) = directive {
        return Ok(Some(target.to_string()));
    }

    if let Some(target) = state.target(AUTO) {
        return Ok(Some(target.to_string()));
    }

    match state.transitions() {
        [] => Ok(None),
        [only] => Ok(Some(only.target.clone())),
        _ => Err(EngineError::AmbiguousTransition(state.name().to_string())),
    }
}

/// Join edge leaving a fork branch state.
pub(crate) fn join_target(branch: &StateNode) -> Result<String, EngineError> {
    match branch.transitions() {
        [only] => Ok(only.target.clone()),
        _ => Err(EngineError::AmbiguousTransition(branch.name().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NoopStep;
    use std::sync::Arc;

    fn state(transitions: &[(&str, &str)]) -> StateNode {
        let mut node = StateNode::new("STEP1", Arc::new(NoopStep), false);
        for (event, target) in transitions {
            node.add_transition(*event, *target, false);
        }
        node
    }

    #[test]
    fn directive_wins_over_everything() {
        let node = state(&[(AUTO, "STEP2"), ("other", "STEP3")]);
        let next = next_state(&node, Some("STEP3")).unwrap();
        assert_eq!(next.as_deref(), Some("STEP3"));
    }

    #[test]
    fn auto_wins_over_other_transitions() {
        let node = state(&[("other", "STEP3"), (AUTO, "STEP2")]);
        let next = next_state(&node, None).unwrap();
        assert_eq!(next.as_deref(), Some("STEP2"));
    }

    #[test]
    fn single_transition_is_taken_whatever_its_name() {
        let node = state(&[("proceed", "END")]);
        let next = next_state(&node, None).unwrap();
        assert_eq!(next.as_deref(), Some("END"));
    }

    #[test]
    fn no_transitions_halts() {
        assert_eq!(next_state(&state(&[]), None).unwrap(), None);
    }

    #[test]
    fn several_transitions_without_guidance_are_ambiguous() {
        let node = state(&[("even", "STEP2"), ("odd", "STEP3")]);
        let err = next_state(&node, None).unwrap_err();
        assert!(matches!(err, EngineError::AmbiguousTransition(s) if s == "STEP1"));
    }

    #[test]
    fn join_edge_requires_exactly_one_transition() {
        assert_eq!(join_target(&state(&[("STEP1_TO_END", "END")])).unwrap(), "END");
        assert!(join_target(&state(&[])).is_err());
    }
}
