//! Builder API for machine construction.
//!
//! The builder collects states, transitions and policy, validates the
//! whole declaration and freezes it into a shared
//! [`MachineDefinition`](crate::engine::MachineDefinition).

pub mod error;
pub mod machine;

pub use error::BuildError;
pub use machine::MachineBuilder;
