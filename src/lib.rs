//! Forkstate: an embeddable state machine engine with fork/join branches
//!
//! A machine is a table of named states, each bound to a processing step and
//! connected by named transitions. The engine runs steps one after another,
//! pauses on states that wait for an external event, routes failures to an
//! exception state, and can fork into branches that run independently
//! (possibly on other threads or processes) before joining back into a
//! single continuation exactly once.
//!
//! # Core Concepts
//!
//! - **States**: a processing step plus a transition table
//! - **Payload**: [`ProcessingData`](core::ProcessingData), the values threaded through every step
//! - **Trace**: a timestamped record of what the machine did
//! - **Snapshots**: serializable machine progress, used to resume and to coordinate branches
//! - **Split handlers**: perform forks and decide, transactionally, when a round is complete
//!
//! # Example
//!
//! ```rust
//! use forkstate::builder::MachineBuilder;
//! use forkstate::core::{FnStep, NoopStep, ProcessingData, StepContext};
//!
//! let mut machine = MachineBuilder::new()
//!     .state("START", FnStep::new("Route", |ctx: &mut StepContext<'_>| {
//!         let value = ctx.get_i64("value").unwrap_or_default();
//!         ctx.next_state(if value % 2 == 0 { "STEP2" } else { "STEP3" });
//!         Ok(())
//!     }))
//!     .conditional("STEP2")
//!     .conditional("STEP3")
//!     .waiting_state("STEP2", FnStep::new("Double", |ctx: &mut StepContext<'_>| {
//!         let value = ctx.get_i64("value").unwrap_or_default();
//!         ctx.set("value", value * 2);
//!         Ok(())
//!     }))
//!     .on("proceed", "END")
//!     .state("STEP3", NoopStep)
//!     .auto("END")
//!     .final_state("END", NoopStep)
//!     .build()
//!     .unwrap();
//!
//! let mut data = ProcessingData::new();
//! data.set("value", 4);
//!
//! machine.start("START", &mut data).unwrap();
//! assert!(machine.is_paused());
//!
//! machine.trigger_event("proceed", &mut data).unwrap();
//! assert!(machine.has_reached_final_state());
//! assert_eq!(data.get_i64("value"), Some(8));
//! ```

pub mod builder;
pub mod core;
pub mod engine;
pub mod snapshot;
pub mod split;

// Re-export commonly used types
pub use builder::{BuildError, MachineBuilder};
pub use core::{ProcessingData, ProcessingStep, StepContext, StepError, Trace};
pub use engine::{EngineError, Machine};
pub use snapshot::{Snapshot, SnapshotError};
pub use split::{ForkJoinCoordinator, MemoryRoundStore, RoundStatus, SplitHandler};
