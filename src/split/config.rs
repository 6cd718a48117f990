//! Fork/join coordinator configuration.

use std::time::Duration;

/// How a coordinator runs the branches of a fork.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Dispatch {
    /// One thread per branch
    #[default]
    Threaded,
    /// Branches run one after another on the calling thread
    Inline,
}

/// Coordinator settings.
///
/// # Example
///
/// ```rust
/// use forkstate::split::{CoordinatorConfig, Dispatch};
/// use std::time::Duration;
///
/// let config = CoordinatorConfig::new()
///     .dispatch(Dispatch::Inline)
///     .branch_timeout(Duration::from_secs(30));
///
/// assert_eq!(config.dispatch, Dispatch::Inline);
/// assert_eq!(config.branch_timeout, Duration::from_secs(30));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub dispatch: Dispatch,
    /// How long to wait for threaded branches to report back
    pub branch_timeout: Duration,
    /// Extra wait, after the branch timeout, for a branch that already
    /// completed the round but is still running the join continuation
    pub late_report_timeout: Duration,
}

impl CoordinatorConfig {
    pub const DEFAULT_BRANCH_TIMEOUT: Duration = Duration::from_secs(5 * 60);
    pub const DEFAULT_LATE_REPORT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dispatch mode
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Set the branch wait budget
    pub fn branch_timeout(mut self, timeout: Duration) -> Self {
        self.branch_timeout = timeout;
        self
    }

    /// Set the wait budget for reports arriving after the branch timeout
    pub fn late_report_timeout(mut self, timeout: Duration) -> Self {
        self.late_report_timeout = timeout;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            dispatch: Dispatch::default(),
            branch_timeout: Self::DEFAULT_BRANCH_TIMEOUT,
            late_report_timeout: Self::DEFAULT_LATE_REPORT_TIMEOUT,
        }
    }
}
