use thiserror::Error;

/// Reasons a snapshot cannot be written, read or applied to a machine.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to encode snapshot: {0}")]
    Encode(String),

    #[error("Failed to decode snapshot: {0}")]
    Decode(String),

    #[error("Snapshot format {found} cannot be read, this build reads format {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// A machine that never started cannot sit on a state.
    #[error("Snapshot of an unstarted machine names current state '{0}'")]
    StateBeforeStart(String),

    /// Branch bookkeeping only exists while the machine sits on a fork source.
    #[error("Snapshot records completed fork branches but no fork source state")]
    BranchesWithoutSource,

    #[error("Snapshot names state '{0}', which this machine does not declare")]
    UndeclaredState(String),
}
