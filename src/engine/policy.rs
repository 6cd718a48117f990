//! What to do when a state fails.

use crate::core::ExceptionInfo;

/// Why a failing machine stops instead of moving to its exception state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TerminateReason {
    NoExceptionState,
    ExceptionStateFailed,
    HookFailure,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FailureAction {
    Terminate(TerminateReason),
    RouteTo(String),
}

/// Decide how to handle `failure` raised while `failing_state` executed.
///
/// Rules are checked in order: no exception state, the exception state
/// itself failing, a hook failure with termination requested, and finally
/// routing to the exception state.
pub(crate) fn on_failure(
    exception_state: Option<&str>,
    terminate_on_hook_error: bool,
    failing_state: &str,
    failure: &ExceptionInfo,
) -> FailureAction {
    let Some(target) = exception_state else {
        return FailureAction::Terminate(TerminateReason::NoExceptionState);
    };

    if target == failing_state {
        return FailureAction::Terminate(TerminateReason::ExceptionStateFailed);
    }

    if failure.is_on_hook() && terminate_on_hook_error {
        return FailureAction::Terminate(TerminateReason::HookFailure);
    }

    FailureAction::RouteTo(target.to_string())
}

/// Pick the failure that decides a join out of everything the branches
/// reported.
///
/// The choice depends only on the set of failures, never on the order in
/// which branches reported them: a hook failure wins when hook failures
/// terminate, otherwise the earliest state name (then message) is used.
pub(crate) fn decisive_failure(
    failures: &[ExceptionInfo],
    terminate_on_hook_error: bool,
) -> Option<&ExceptionInfo> {
    if terminate_on_hook_error {
        if let Some(hook) = earliest(failures.iter().filter(|f| f.is_on_hook())) {
            return Some(hook);
        }
    }
    earliest(failures.iter())
}

fn earliest<'a>(failures: impl Iterator<Item = &'a ExceptionInfo>) -> Option<&'a ExceptionInfo> {
    failures.min_by(|a, b| (&a.state, &a.message).cmp(&(&b.state, &b.message)))
}

impl TerminateReason {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            Self::NoExceptionState => {
                "Stopping because of exception and no onExceptionState transition defined"
            }
            Self::ExceptionStateFailed => "Exception handler threw exception, stopping",
            Self::HookFailure => {
                "Stopping because of exception in an execution hook and terminate on hook error is set"
            }
        }
    }
}
