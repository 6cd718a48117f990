//! Approval Workflow
//!
//! A document is drafted, waits for a reviewer, and is either published or
//! sent back. The paused machine is exported to JSON and resumed by a fresh
//! machine, as a service restarting between the two requests would.
//!
//! Key concepts:
//! - Waiting states and externally triggered events
//! - Routing with `ctx.next_state`
//! - Exception state for failed steps
//! - Snapshot export and import
//!
//! Run with: cargo run --example approval_workflow

use forkstate::builder::MachineBuilder;
use forkstate::core::{FnStep, NoopStep, ProcessingData, StepContext};
use forkstate::Machine;
use tracing_subscriber::EnvFilter;

fn workflow() -> Machine {
    MachineBuilder::new()
        .state(
            "DRAFT",
            FnStep::new("Draft", |ctx: &mut StepContext<'_>| {
                let words = ctx.get_i64("words").ok_or("word count missing")?;
                if words == 0 {
                    return Err("empty document".into());
                }
                ctx.log(format!("Drafted {words} words"));
                Ok(())
            }),
        )
        .auto("REVIEW")
        .waiting_state("REVIEW", NoopStep)
        .on("approve", "PUBLISHED")
        .on("reject", "DRAFT")
        .final_state(
            "PUBLISHED",
            FnStep::new("Publish", |ctx: &mut StepContext<'_>| {
                ctx.set("published", true);
                ctx.log("Published");
                Ok(())
            }),
        )
        .state(
            "FAILED",
            FnStep::new("Report", |ctx: &mut StepContext<'_>| {
                let reason = ctx
                    .first_exception()
                    .map(|e| e.message.clone())
                    .unwrap_or_default();
                ctx.log(format!("Workflow failed: {reason}"));
                Ok(())
            }),
        )
        .on_exception_go_to("FAILED")
        .with_name("approval")
        .with_trace()
        .build()
        .expect("workflow declaration is valid")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    println!("=== Approval Workflow Example ===\n");

    let mut machine = workflow();
    let mut data = ProcessingData::new();
    data.set("words", 1200);

    machine.start("DRAFT", &mut data)?;
    println!("Paused on: {}", machine.paused_on_state()?.name());

    // Persist between requests.
    let snapshot = machine.export_json()?;
    let payload = data.to_json()?;
    println!("Snapshot: {snapshot}\n");

    let mut resumed = workflow();
    resumed.import_json(&snapshot)?;
    let mut data = ProcessingData::from_json(&payload)?;

    resumed.trigger_event("approve", &mut data)?;
    println!("Final state: {}", resumed.final_state()?.name());
    println!("Payload: {data}");

    println!("\nTrace:");
    for entry in resumed.trace().entries() {
        println!("  {} {}", entry.timestamp.format("%H:%M:%S%.3f"), entry.message);
    }

    println!("\n=== Failing draft ===\n");

    let mut machine = workflow();
    let mut data = ProcessingData::new();
    data.set("words", 0);
    machine.start("DRAFT", &mut data)?;
    println!("Final state: {}", machine.final_state()?.name());

    println!("\n=== Example Complete ===");
    Ok(())
}
