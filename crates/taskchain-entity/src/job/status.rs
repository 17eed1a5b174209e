//! Job state and failure cause enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a job inside the queue.
///
/// ```text
/// available -> running -> completed
///                      -> available   (retry scheduled)
///                      -> failed      (permanent)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Due (or scheduled to become due) and not claimed by any executor.
    Available,
    /// Claimed by exactly one executor slot.
    Running,
    /// The worker succeeded.
    Completed,
    /// Failed permanently; will never run again.
    Failed,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an attempt failed. Recorded with every failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The worker returned an error.
    Error,
    /// Enqueuing a follow-up job failed.
    Chain,
    /// The execution exceeded the per-job timeout.
    Timeout,
    /// The worker panicked.
    Panic,
    /// The worker declared the failure non-retryable.
    Permanent,
    /// The stored arguments could not be decoded for the worker.
    InvalidArgs,
    /// No worker is registered for the job's kind.
    Unroutable,
}

impl FailureCause {
    /// Return the cause as a snake_case tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Chain => "chain",
            Self::Timeout => "timeout",
            Self::Panic => "panic",
            Self::Permanent => "permanent",
            Self::InvalidArgs => "invalid_args",
            Self::Unroutable => "unroutable",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
