//! Reference fork/join coordinator.

use super::config::{CoordinatorConfig, Dispatch};
use super::store::{RoundKey, RoundRecord, RoundStore, StoreError};
use super::{RoundStatus, SplitHandler};
use crate::core::{ExceptionInfo, FailureOrigin, ProcessingData};
use crate::engine::{EngineError, Machine};
use crate::snapshot::Snapshot;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Runs fork branches on machine copies and joins them through a
/// [`RoundStore`].
///
/// The store is injected, so the same coordinator works against an
/// in-memory store or a durable one shared between processes.
///
/// Branches that have not reported back when the branch timeout elapses
/// are recorded as failed on their behalf. Their threads are detached, and
/// a report arriving later is rejected by the round.
///
/// # Example
///
/// ```rust
/// use forkstate::builder::MachineBuilder;
/// use forkstate::core::{FnStep, NoopStep, ProcessingData, StepContext};
/// use forkstate::split::{CoordinatorConfig, Dispatch, ForkJoinCoordinator, MemoryRoundStore};
/// use std::sync::Arc;
///
/// let coordinator = ForkJoinCoordinator::with_config(
///     Arc::new(MemoryRoundStore::new()),
///     CoordinatorConfig::new().dispatch(Dispatch::Inline),
/// );
///
/// let mut machine = MachineBuilder::new()
///     .state("FORK", NoopStep)
///     .split("LEFT")
///     .split("RIGHT")
///     .state("LEFT", FnStep::new("Left", |ctx: &mut StepContext<'_>| {
///         ctx.set("left", 1);
///         Ok(())
///     }))
///     .join("DONE")
///     .state("RIGHT", FnStep::new("Right", |ctx: &mut StepContext<'_>| {
///         ctx.set("right", 2);
///         Ok(())
///     }))
///     .join("DONE")
///     .final_state("DONE", NoopStep)
///     .split_handler(coordinator)
///     .build()
///     .unwrap();
///
/// let mut data = ProcessingData::new();
/// machine.start("FORK", &mut data).unwrap();
///
/// assert_eq!(machine.current_state(), Some("DONE"));
/// assert_eq!(data.get_i64("left"), Some(1));
/// assert_eq!(data.get_i64("right"), Some(2));
/// ```
pub struct ForkJoinCoordinator<S: RoundStore> {
    store: Arc<S>,
    config: CoordinatorConfig,
}

/// What a branch hands back once it is done with the round.
struct BranchOutcome {
    status: RoundStatus,
    snapshot: Snapshot,
    data: ProcessingData,
}

struct BranchReport {
    branch: String,
    result: Result<BranchOutcome, EngineError>,
}

impl<S: RoundStore + 'static> ForkJoinCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, CoordinatorConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: CoordinatorConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn dispatch(
        &self,
        machine: &Machine,
        snapshot: &Snapshot,
        data: &ProcessingData,
        branches: &[(String, String)],
        tx: &Sender<BranchReport>,
    ) -> Result<(), EngineError> {
        for (event, branch) in branches {
            let mut copy = machine.empty_copy();
            copy.import(snapshot)?;
            let branch_data = data.clone();

            match self.config.dispatch {
                Dispatch::Inline => {
                    let result = run_branch(copy, event, branch_data);
                    send_report(tx, branch.clone(), result);
                }
                Dispatch::Threaded => {
                    let tx = tx.clone();
                    let event = event.clone();
                    let branch_name = branch.clone();
                    let spawned = thread::Builder::new()
                        .name(format!("fork-{branch}"))
                        .spawn(move || {
                            let result = run_branch(copy, &event, branch_data);
                            send_report(&tx, branch_name, result);
                        });

                    // An unspawned branch is accounted for like one that timed out.
                    if let Err(e) = spawned {
                        tracing::warn!(branch = %branch, error = %e, "Failed to spawn fork branch");
                    }
                }
            }
        }
        Ok(())
    }

    /// Wait for the branches and return the outcome of the one that joined.
    fn collect(
        &self,
        machine: &Machine,
        snapshot: &Snapshot,
        data: &ProcessingData,
        source: &str,
        branches: &[(String, String)],
        rx: &Receiver<BranchReport>,
    ) -> Result<BranchOutcome, EngineError> {
        let deadline = Instant::now() + self.config.branch_timeout;
        let mut joined = None;
        let mut first_error = None;
        let mut reported = HashSet::new();

        while reported.len() < branches.len() {
            match rx.recv_deadline(deadline) {
                Ok(report) => {
                    reported.insert(report.branch.clone());
                    absorb(report, &mut joined, &mut first_error);
                }
                Err(_) => break,
            }
        }

        let mut late = 0;
        for (_, branch) in branches.iter().filter(|(_, b)| !reported.contains(b)) {
            tracing::warn!(
                source,
                branch = %branch,
                timeout = ?self.config.branch_timeout,
                "Fork branch did not report back, recording it as failed"
            );

            let mut stand_in = machine.empty_copy();
            stand_in.import(snapshot)?;
            let mut stand_in_data = data.clone();
            stand_in_data.add_exception(ExceptionInfo::new(
                branch,
                format!(
                    "branch did not report back within {:?}",
                    self.config.branch_timeout
                ),
                FailureOrigin::BranchTimeout,
            ));

            match stand_in.finish_split_branch(source, branch, &mut stand_in_data) {
                Ok(RoundStatus::Complete) => {
                    joined = Some(BranchOutcome {
                        status: RoundStatus::Complete,
                        snapshot: stand_in.export(),
                        data: stand_in_data,
                    });
                }
                Ok(RoundStatus::Pending) => {}
                // The branch itself got to the round first.
                Ok(RoundStatus::AlreadyRecorded)
                | Err(EngineError::Store(StoreError::NotFound(_))) => late += 1,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        // A branch that reported after the deadline may own the join.
        if joined.is_none() && late > 0 {
            let late_deadline = Instant::now() + self.config.late_report_timeout;
            while let Ok(report) = rx.recv_deadline(late_deadline) {
                absorb(report, &mut joined, &mut first_error);
                if joined.is_some() {
                    break;
                }
            }
            if joined.is_none() {
                tracing::warn!(
                    source,
                    timeout = ?self.config.late_report_timeout,
                    "Branch owning the join never reported back"
                );
            }
        }

        joined.ok_or_else(|| {
            first_error.unwrap_or_else(|| EngineError::JoinIncomplete(source.to_string()))
        })
    }
}

impl<S: RoundStore + 'static> SplitHandler for ForkJoinCoordinator<S> {
    fn handle_split(
        &self,
        machine: &mut Machine,
        data: &mut ProcessingData,
        split_transitions: &[String],
    ) -> Result<(), EngineError> {
        let source = machine
            .current_state()
            .map(str::to_string)
            .ok_or(EngineError::Concluded)?;
        let source_node = machine
            .state(&source)
            .ok_or_else(|| EngineError::UnknownState(source.clone()))?;

        let branches = split_transitions
            .iter()
            .map(|event| {
                source_node
                    .target(event)
                    .map(|target| (event.clone(), target.to_string()))
                    .ok_or_else(|| EngineError::InvalidSplitTransition {
                        state: source.clone(),
                        transition: event.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let key = RoundKey::new(machine.id(), &source);
        let snapshot = machine.export();
        self.store.open(key.clone(), RoundRecord::new(snapshot.clone()))?;
        tracing::debug!(round = %key, branches = branches.len(), dispatch = ?self.config.dispatch, "Fork round opened");

        let (tx, rx) = bounded(branches.len());
        let outcome = self
            .dispatch(machine, &snapshot, data, &branches, &tx)
            .and_then(|()| {
                drop(tx);
                self.collect(machine, &snapshot, data, &source, &branches, &rx)
            });

        // Completing the round closes it; anything left means the join never fired.
        match self.store.remove(&key) {
            Ok(_) => tracing::warn!(round = %key, "Closed fork round that never completed"),
            Err(StoreError::NotFound(_)) => {}
            Err(e) => tracing::warn!(round = %key, error = %e, "Failed to close fork round"),
        }

        let joined = outcome?;
        machine.import(&joined.snapshot)?;
        *data = joined.data;
        Ok(())
    }

    fn get_and_update_state_and_data(
        &self,
        machine: &mut Machine,
        data: &mut ProcessingData,
        source_state: &str,
        completed_branch: &str,
    ) -> Result<RoundStatus, EngineError> {
        let key = RoundKey::new(machine.id(), source_state);
        let expected = machine
            .state(source_state)
            .ok_or_else(|| EngineError::UnknownState(source_state.to_string()))?
            .split_transitions()
            .count();

        let status = self
            .store
            .update(&key, |record| -> Result<RoundStatus, EngineError> {
                let mut shared = machine.empty_copy();
                shared.import(&record.snapshot)?;

                if shared.completed_split_states().contains(completed_branch) {
                    return Ok(RoundStatus::AlreadyRecorded);
                }

                shared.merge_trace_from(machine);
                shared.record_completed_split_state(completed_branch);
                let complete = shared.completed_split_states().len() == expected;

                record.snapshot = shared.export();
                machine.import(&record.snapshot)?;

                data.merge_from(&record.data);
                record.data = data.clone();

                Ok(if complete {
                    RoundStatus::Complete
                } else {
                    RoundStatus::Pending
                })
            })?;

        if status == RoundStatus::Complete {
            tracing::info!(round = %key, branches = expected, "All fork branches reported");
            if let Err(e) = self.store.remove(&key) {
                tracing::warn!(round = %key, error = %e, "Failed to close completed fork round");
            }
        }

        Ok(status)
    }
}

fn run_branch(
    mut machine: Machine,
    event: &str,
    mut data: ProcessingData,
) -> Result<BranchOutcome, EngineError> {
    let status = machine.continue_on_split_state(event, &mut data)?;
    Ok(BranchOutcome {
        status,
        snapshot: machine.export(),
        data,
    })
}

fn send_report(
    tx: &Sender<BranchReport>,
    branch: String,
    result: Result<BranchOutcome, EngineError>,
) {
    if let Err(e) = &result {
        tracing::warn!(branch = %branch, error = %e, "Fork branch failed");
    }
    if tx.send(BranchReport { branch, result }).is_err() {
        tracing::debug!("Fork already resolved, dropping branch report");
    }
}

fn absorb(
    report: BranchReport,
    joined: &mut Option<BranchOutcome>,
    first_error: &mut Option<EngineError>,
) {
    match report.result {
        Ok(outcome) if outcome.status == RoundStatus::Complete => *joined = Some(outcome),
        Ok(_) => {}
        Err(e) => {
            if first_error.is_none() {
                *first_error = Some(e);
            }
        }
    }
}
