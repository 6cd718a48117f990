//! Execution trace tracking.
//!
//! A trace is an ordered, timestamped record of what a machine did. It is
//! carried inside every snapshot, so branches running elsewhere can merge
//! their entries back into the shared machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A single timestamped trace message.
///
/// Two entries are equal only when both the timestamp and the message match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the message was recorded
    pub timestamp: DateTime<Utc>,
    /// The recorded message
    pub message: String,
}

impl LogEntry {
    /// Create an entry with an explicit timestamp.
    pub fn new(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }

    /// Create an entry stamped with the current time.
    pub fn now(message: impl Into<String>) -> Self {
        Self::new(Utc::now(), message)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.timestamp.to_rfc3339(), self.message)
    }
}

/// Ordered trace of machine activity.
///
/// Engine notes are only recorded when trace mode is enabled; entries pushed
/// explicitly (for example log lines from a processing step) are always kept.
///
/// # Example
///
/// ```rust
/// use forkstate::core::Trace;
///
/// let mut trace = Trace::enabled();
/// trace.record(|| "Entering state: START".to_string());
/// trace.add("always kept");
///
/// let mut quiet = Trace::new();
/// quiet.record(|| "dropped".to_string());
///
/// assert_eq!(trace.len(), 2);
/// assert!(quiet.is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    entries: Vec<LogEntry>,
    #[serde(default)]
    enabled: bool,
}

impl Trace {
    /// Create an empty trace with trace mode disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty trace with trace mode enabled.
    pub fn enabled() -> Self {
        Self {
            entries: Vec::new(),
            enabled: true,
        }
    }

    /// Whether engine notes are being recorded.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn trace mode on or off. Existing entries are kept.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Append a message stamped with the current time, regardless of trace mode.
    pub fn add(&mut self, message: impl Into<String>) {
        self.entries.push(LogEntry::now(message));
    }

    /// Append an entry as-is, regardless of trace mode.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Append a message only when trace mode is enabled.
    ///
    /// The message is built lazily so disabled traces pay nothing for formatting.
    pub fn record<F>(&mut self, message: F)
    where
        F: FnOnce() -> String,
    {
        if self.enabled {
            self.add(message());
        }
    }

    /// Add entries, keeping insertion order and dropping exact duplicates.
    ///
    /// Duplicates already present in this trace are collapsed as well, so
    /// the result holds each (timestamp, message) pair once, in order of
    /// first appearance.
    ///
    /// # Example
    ///
    /// ```rust
    /// use chrono::Utc;
    /// use forkstate::core::{LogEntry, Trace};
    ///
    /// let at = Utc::now();
    /// let mut trace = Trace::new();
    /// trace.push(LogEntry::new(at, "split1"));
    ///
    /// trace.extend(vec![LogEntry::new(at, "split1"), LogEntry::new(at, "split2")]);
    ///
    /// let messages: Vec<_> = trace.entries().iter().map(|e| e.message.as_str()).collect();
    /// assert_eq!(messages, ["split1", "split2"]);
    /// ```
    pub fn extend<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = LogEntry>,
    {
        let mut seen = HashSet::with_capacity(self.entries.len());
        let mut merged = Vec::with_capacity(self.entries.len());

        for entry in self.entries.drain(..).chain(entries) {
            if seen.insert((entry.timestamp, entry.message.clone())) {
                merged.push(entry);
            }
        }

        self.entries = merged;
    }

    /// Merge another trace into this one.
    ///
    /// Relative order of each trace is preserved and identical entries are
    /// not duplicated. Trace mode of `self` is left unchanged.
    pub fn merge(&mut self, other: &Trace) {
        self.extend(other.entries.iter().cloned());
    }

    /// All entries in order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Iterate over recorded messages in order.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.message.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}
