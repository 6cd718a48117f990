//! Parallel Checks
//!
//! An order forks into independent fraud, stock and address checks that run
//! on their own threads. Whichever check finishes last joins the machine and
//! carries it on to the decision state, which runs exactly once.
//!
//! Key concepts:
//! - Split transitions and joining states
//! - The fork/join coordinator and its round store
//! - Branch timeouts
//! - Merged traces from every branch
//!
//! Run with: cargo run --example parallel_checks

use forkstate::builder::MachineBuilder;
use forkstate::core::{FnStep, NoopStep, ProcessingData, ProcessingStep, StepContext};
use forkstate::split::{CoordinatorConfig, Dispatch, ForkJoinCoordinator, MemoryRoundStore};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn check(name: &'static str, millis: u64) -> impl ProcessingStep {
    FnStep::new(name, move |ctx: &mut StepContext<'_>| {
        thread::sleep(Duration::from_millis(millis));
        ctx.set(name, true);
        ctx.log(format!("{name} check passed after {millis}ms"));
        Ok(())
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Parallel Checks Example ===\n");

    let store = Arc::new(MemoryRoundStore::new());
    let coordinator = ForkJoinCoordinator::with_config(
        Arc::clone(&store),
        CoordinatorConfig::new()
            .dispatch(Dispatch::Threaded)
            .branch_timeout(Duration::from_secs(2)),
    );

    let mut machine = MachineBuilder::new()
        .state("RECEIVED", NoopStep)
        .split("FRAUD")
        .split("STOCK")
        .split("ADDRESS")
        .state("FRAUD", check("fraud", 120))
        .join("DECIDE")
        .state("STOCK", check("stock", 40))
        .join("DECIDE")
        .state("ADDRESS", check("address", 80))
        .join("DECIDE")
        .state(
            "DECIDE",
            FnStep::new("Decide", |ctx: &mut StepContext<'_>| {
                let passed = ["fraud", "stock", "address"]
                    .iter()
                    .all(|key| ctx.get_as::<bool>(key).unwrap_or(false));
                ctx.next_state(if passed { "SHIPPED" } else { "HELD" });
                Ok(())
            }),
        )
        .conditional("SHIPPED")
        .conditional("HELD")
        .final_state("SHIPPED", NoopStep)
        .final_state("HELD", NoopStep)
        .on_exception_go_to("HELD")
        .split_handler(coordinator)
        .with_name("order-1042")
        .with_trace()
        .build()?;

    let mut data = ProcessingData::new();
    machine.start("RECEIVED", &mut data)?;

    println!("Final state: {}", machine.final_state()?.name());
    println!("Payload: {data}");
    println!("Open rounds: {}", store.len());

    println!("\nTrace:");
    for message in machine.trace().messages() {
        println!("  {message}");
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
