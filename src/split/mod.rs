//! Forking a machine into branches and joining them again.
//!
//! When a machine reaches a state with split transitions it hands itself to
//! its [`SplitHandler`]. The handler makes the machine's progress durable,
//! runs one branch per split transition on independent copies of the
//! machine, and funnels every branch completion through a single
//! transactional accounting step. The branch whose report completes the
//! round is the one that continues past the join.
//!
//! [`ForkJoinCoordinator`] is the reference handler, backed by any
//! [`RoundStore`].

mod config;
mod coordinator;
mod store;

pub use config::{CoordinatorConfig, Dispatch};
pub use coordinator::ForkJoinCoordinator;
pub use store::{MemoryRoundStore, RoundKey, RoundRecord, RoundStore, StoreError};

use crate::core::ProcessingData;
use crate::engine::{EngineError, Machine};

/// Outcome of reporting one branch to its round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundStatus {
    /// Other branches have yet to report
    Pending,
    /// This report completed the round; the reporter continues past the join
    Complete,
    /// The branch was already recorded; nothing changed
    AlreadyRecorded,
}

/// Performs forks on behalf of a machine.
pub trait SplitHandler: Send + Sync {
    /// Run every branch of the fork the machine just reached.
    ///
    /// `machine` is positioned on the fork source state. When this returns
    /// successfully the machine and `data` reflect the joined continuation.
    fn handle_split(
        &self,
        machine: &mut Machine,
        data: &mut ProcessingData,
        split_transitions: &[String],
    ) -> Result<(), EngineError>;

    /// Record `completed_branch` of the round forked from `source_state`.
    ///
    /// Must run as one transactional unit: load the round, merge the
    /// branch's trace and payload, record the branch, decide completeness
    /// and store the result. Exactly one caller per round may observe
    /// [`RoundStatus::Complete`].
    fn get_and_update_state_and_data(
        &self,
        machine: &mut Machine,
        data: &mut ProcessingData,
        source_state: &str,
        completed_branch: &str,
    ) -> Result<RoundStatus, EngineError>;
}
