//! Property-based tests for traces, resolution, exception routing and snapshots.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

use chrono::{Duration, TimeZone, Utc};
use forkstate::builder::MachineBuilder;
use forkstate::core::{FnStep, LogEntry, NoopStep, ProcessingData, StepContext, Trace};
use forkstate::{EngineError, Machine};
use proptest::prelude::*;
use std::collections::HashSet;

prop_compose! {
    fn arbitrary_trace()(entries in prop::collection::vec((0..5i64, 0..4u8), 0..12)) -> Trace {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut trace = Trace::new();
        for (offset, message) in entries {
            trace.push(LogEntry::new(base + Duration::milliseconds(offset), format!("message {message}")));
        }
        trace
    }
}

fn dedup(entries: &[LogEntry]) -> Vec<LogEntry> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| seen.insert((e.timestamp, e.message.clone())))
        .cloned()
        .collect()
}

/// Linear machine S0 -> S1 -> ... -> END with the step at `failing` failing
/// and `wait` pausing.
fn chain(len: usize, failing: Option<usize>, wait: Option<usize>, exception_fails: bool) -> Machine {
    let mut builder = MachineBuilder::new().with_trace();
    for i in 0..len {
        let name = format!("S{i}");
        let fails = failing == Some(i);
        let step = FnStep::new(name.clone(), move |ctx: &mut StepContext<'_>| {
            if fails {
                return Err("step failed".into());
            }
            let visits = ctx.get_i64("visits").unwrap_or_default();
            ctx.set("visits", visits + 1);
            Ok(())
        });
        builder = if wait == Some(i) {
            builder.waiting_state(name, step)
        } else {
            builder.state(name, step)
        };
        let next = if i + 1 == len { "END".to_string() } else { format!("S{}", i + 1) };
        builder = builder.on("next", next);
    }

    let error_step = FnStep::new("Error", move |_ctx: &mut StepContext<'_>| {
        if exception_fails {
            Err("handler failed".into())
        } else {
            Ok(())
        }
    });

    builder
        .final_state("END", NoopStep)
        .state("ERROR", error_step)
        .on_exception_go_to("ERROR")
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn trace_merge_preserves_order_and_drops_exact_duplicates(
        first in arbitrary_trace(),
        second in arbitrary_trace(),
    ) {
        let mut merged = first.clone();
        merged.merge(&second);

        let mut expected = first.entries().to_vec();
        expected.extend(second.entries().iter().cloned());
        let deduped = dedup(&expected);
        prop_assert_eq!(merged.entries(), deduped.as_slice());
    }

    #[test]
    fn trace_merge_is_idempotent(trace in arbitrary_trace()) {
        let mut once = trace.clone();
        once.merge(&trace);
        let mut twice = once.clone();
        twice.merge(&trace);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn single_transition_is_followed_and_several_are_ambiguous(count in 0..5usize) {
        let mut builder = MachineBuilder::new().state("S", NoopStep);
        for i in 0..count {
            builder = builder.on(format!("event{i}"), format!("T{i}"));
        }
        for i in 0..count {
            builder = builder.final_state(format!("T{i}"), NoopStep);
        }
        let mut machine = builder.build().unwrap();

        let result = machine.start("S", &mut ProcessingData::new());

        match count {
            0 => {
                prop_assert!(result.is_ok());
                prop_assert_eq!(machine.current_state(), Some("S"));
            }
            1 => {
                prop_assert!(result.is_ok());
                prop_assert_eq!(machine.current_state(), Some("T0"));
            }
            _ => prop_assert!(matches!(result, Err(EngineError::AmbiguousTransition(s)) if s == "S")),
        }
    }

    #[test]
    fn failures_always_route_to_the_exception_state(len in 1..6usize, at in 0..6usize) {
        let failing = at % len;
        let mut machine = chain(len, Some(failing), None, false);
        let mut data = ProcessingData::new();

        machine.start("S0", &mut data).unwrap();

        prop_assert_eq!(machine.current_state(), Some("ERROR"));
        prop_assert!(machine.is_concluded());
        prop_assert_eq!(data.get_i64("visits").unwrap_or_default(), failing as i64);
        prop_assert_eq!(data.first_exception().map(|e| e.state.clone()), Some(format!("S{failing}")));
    }

    #[test]
    fn failing_exception_state_always_terminates(len in 1..6usize, at in 0..6usize) {
        let mut machine = chain(len, Some(at % len), None, true);
        machine.start("S0", &mut ProcessingData::new()).unwrap();

        prop_assert!(machine.was_terminated());
        prop_assert_eq!(machine.current_state(), None);
    }

    #[test]
    fn snapshot_round_trip_preserves_progress(
        len in 1..6usize,
        wait in prop::option::of(0..6usize),
        failing in prop::option::of(0..6usize),
        exception_fails in any::<bool>(),
        started in any::<bool>(),
    ) {
        let wait = wait.map(|w| w % len);
        let failing = failing.map(|f| f % len);
        let mut machine = chain(len, failing, wait, exception_fails);
        if started {
            machine.start("S0", &mut ProcessingData::new()).unwrap();
        }

        let json = machine.export_json().unwrap();
        let mut restored = chain(len, failing, wait, exception_fails);
        restored.import_json(&json).unwrap();

        prop_assert_eq!(restored.id(), machine.id());
        prop_assert_eq!(restored.current_state(), machine.current_state());
        prop_assert_eq!(restored.is_started(), machine.is_started());
        prop_assert_eq!(restored.is_paused(), machine.is_paused());
        prop_assert_eq!(restored.was_terminated(), machine.was_terminated());
        prop_assert_eq!(restored.trace(), machine.trace());
    }
}
