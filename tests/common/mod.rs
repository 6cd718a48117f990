//! Processing steps and machines shared by the integration tests.

#![allow(dead_code)]

use forkstate::builder::MachineBuilder;
use forkstate::core::{ExecutionHooks, NoopStep, ProcessingData, ProcessingStep, StateNode, StepContext, StepError};
use forkstate::split::{CoordinatorConfig, Dispatch, ForkJoinCoordinator, MemoryRoundStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Routes even values to STEP2 and odd values to STEP3.
pub struct Step1;

impl ProcessingStep for Step1 {
    fn process(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        ctx.log("Processing Step 1");
        let value = ctx.get_i64("value").ok_or("value missing")?;
        ctx.next_state(if value % 2 == 0 { "STEP2" } else { "STEP3" });
        Ok(())
    }
}

/// Doubles the value.
pub struct Step2;

impl ProcessingStep for Step2 {
    fn process(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        ctx.log("Processing Step 2");
        let value = ctx.get_i64("value").ok_or("value missing")?;
        ctx.set("value", value * 2);
        Ok(())
    }
}

/// Subtracts three from the value.
pub struct Step3;

impl ProcessingStep for Step3 {
    fn process(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        ctx.log("Processing Step 3");
        let value = ctx.get_i64("value").ok_or("value missing")?;
        ctx.set("value", value - 3);
        Ok(())
    }
}

pub struct Step4;

impl ProcessingStep for Step4 {
    fn process(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        ctx.log("Processing Step 4");
        Ok(())
    }
}

pub struct Split1;

impl ProcessingStep for Split1 {
    fn process(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        ctx.log("split1");
        ctx.set("value1", 2);
        Ok(())
    }
}

pub struct Split2;

impl ProcessingStep for Split2 {
    fn process(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        ctx.log("split2");
        ctx.set("value2", 3);
        Ok(())
    }
}

/// Sums both branch contributions and counts how often it ran.
pub struct SplitEnd {
    pub runs: Arc<AtomicUsize>,
}

impl ProcessingStep for SplitEnd {
    fn process(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        ctx.log("Split End");
        self.runs.fetch_add(1, Ordering::SeqCst);
        let value1 = ctx.get_i64("value1").ok_or("value1 missing")?;
        let value2 = ctx.get_i64("value2").ok_or("value2 missing")?;
        ctx.set("value_sum", value1 + value2);
        Ok(())
    }
}

/// Always fails.
pub struct Fails(pub &'static str);

impl ProcessingStep for Fails {
    fn process(&self, _ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        Err(self.0.into())
    }
}

/// Sleeps before delegating, to force a completion order between branches.
pub struct Delayed<P> {
    pub delay: Duration,
    pub inner: P,
}

impl<P: ProcessingStep> ProcessingStep for Delayed<P> {
    fn process(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        thread::sleep(self.delay);
        self.inner.process(ctx)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Records its failure message under "error".
pub struct ExceptionHandler;

impl ProcessingStep for ExceptionHandler {
    fn process(&self, ctx: &mut StepContext<'_>) -> Result<(), StepError> {
        let message = ctx
            .first_exception()
            .map(|e| e.message.clone())
            .unwrap_or_default();
        ctx.set("error", message);
        Ok(())
    }
}

/// Hooks that fail before or after a step, on every state or on `only`.
#[derive(Default)]
pub struct FailingHooks {
    pub before: bool,
    pub after: bool,
    pub only: Option<&'static str>,
}

impl FailingHooks {
    fn applies(&self, state: &StateNode) -> bool {
        self.only.map_or(true, |name| name == state.name())
    }
}

impl ExecutionHooks for FailingHooks {
    fn before(&self, state: &StateNode, _data: &mut ProcessingData) -> Result<(), StepError> {
        if self.before && self.applies(state) {
            return Err("before hook failed".into());
        }
        Ok(())
    }

    fn after(&self, state: &StateNode, _data: &mut ProcessingData) -> Result<(), StepError> {
        if self.after && self.applies(state) {
            return Err("after hook failed".into());
        }
        Ok(())
    }
}

pub fn coordinator(dispatch: Dispatch) -> (Arc<MemoryRoundStore>, ForkJoinCoordinator<MemoryRoundStore>) {
    let store = Arc::new(MemoryRoundStore::new());
    let coordinator = ForkJoinCoordinator::with_config(
        Arc::clone(&store),
        CoordinatorConfig::new().dispatch(dispatch),
    );
    (store, coordinator)
}

/// START -> STEP_SPLIT -> {SPLIT1, SPLIT2} -> SPLIT_END -> END, with END
/// doubling as the exception state.
pub fn split_machine() -> MachineBuilder {
    split_machine_with(Split1, Split2, Arc::new(AtomicUsize::new(0)))
}

pub fn split_machine_with<A, B>(split1: A, split2: B, runs: Arc<AtomicUsize>) -> MachineBuilder
where
    A: ProcessingStep + 'static,
    B: ProcessingStep + 'static,
{
    MachineBuilder::new()
        .state("START", NoopStep)
        .auto("STEP_SPLIT")
        .state("STEP_SPLIT", NoopStep)
        .split("SPLIT1")
        .split("SPLIT2")
        .state("SPLIT1", split1)
        .join("SPLIT_END")
        .state("SPLIT2", split2)
        .join("SPLIT_END")
        .state("SPLIT_END", SplitEnd { runs })
        .auto("END")
        .final_state("END", NoopStep)
        .with_name("Test FSM")
        .with_trace()
}
