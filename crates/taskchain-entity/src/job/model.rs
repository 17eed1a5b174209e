//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::args::JobArgs;
use super::id::JobId;
use super::status::{FailureCause, JobState};

/// A job as stored by the queue.
///
/// Executors only ever see a snapshot of this record; every change goes
/// through the queue's state-transition calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Job kind (e.g. `"multiply_two"`).
    pub kind: String,
    /// Serialized arguments.
    pub args: Value,
    /// Current state.
    pub state: JobState,
    /// Number of times the job has been claimed. `1` during the first execution.
    pub attempt: u32,
    /// Per-job override of the pool's attempt limit.
    pub max_attempts: Option<u32>,
    /// Earliest time the job may be claimed.
    pub scheduled_at: DateTime<Utc>,
    /// When the current or last attempt started.
    pub attempted_at: Option<DateTime<Utc>>,
    /// When the current claim expires and the job becomes claimable again.
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub finalized_at: Option<DateTime<Utc>>,
    /// Value returned by the worker on success.
    pub result: Option<Value>,
    /// One entry per failed attempt, oldest first.
    pub errors: Vec<AttemptError>,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Decode the stored arguments into the worker's typed shape.
    pub fn decode_args<A: JobArgs>(&self) -> Result<A, serde_json::Error> {
        A::deserialize(&self.args)
    }

    /// Attempt limit for this job given the pool default.
    pub fn attempt_limit(&self, pool_default: u32) -> u32 {
        self.max_attempts.unwrap_or(pool_default)
    }

    /// Most recent failure, if any.
    pub fn last_error(&self) -> Option<&AttemptError> {
        self.errors.last()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// A failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptError {
    /// Attempt number that failed (1-based).
    pub attempt: u32,
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
    /// Failure category.
    pub cause: FailureCause,
    /// Human-readable error message.
    pub message: String,
}

impl AttemptError {
    pub fn new(attempt: u32, cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            attempt,
            at: Utc::now(),
            cause,
            message: message.into(),
        }
    }
}

/// Data required to enqueue a new job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    /// Job kind.
    pub kind: String,
    /// Serialized arguments.
    pub args: Value,
    /// Earliest run time (`None` = immediately).
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Per-job attempt limit override.
    pub max_attempts: Option<u32>,
}

impl NewJob {
    /// Build an immediately-due job from typed arguments.
    pub fn from_args<A: JobArgs>(args: &A) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: A::KIND.to_string(),
            args: serde_json::to_value(args)?,
            scheduled_at: None,
            max_attempts: None,
        })
    }

    /// Build a job from a raw kind and JSON arguments.
    pub fn raw(kind: impl Into<String>, args: Value) -> Self {
        Self {
            kind: kind.into(),
            args,
            scheduled_at: None,
            max_attempts: None,
        }
    }

    /// Delay the job until `at`.
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Override the attempt limit for this job.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct CountArgs {
        number: i64,
    }

    impl JobArgs for CountArgs {
        const KIND: &'static str = "count";
    }

    fn job_with_args(args: Value) -> Job {
        let now = Utc::now();
        Job {
            id: JobId::new(),
            kind: "count".to_string(),
            args,
            state: JobState::Running,
            attempt: 1,
            max_attempts: None,
            scheduled_at: now,
            attempted_at: Some(now),
            lease_expires_at: None,
            finalized_at: None,
            result: None,
            errors: Vec::new(),
            created_at: now,
        }
    }

    #[test]
    fn test_new_job_from_args_uses_kind() {
        let new_job = NewJob::from_args(&CountArgs { number: 5 }).unwrap();
        assert_eq!(new_job.kind, "count");
        assert_eq!(new_job.args, json!({ "number": 5 }));
        assert!(new_job.scheduled_at.is_none());
    }

    #[test]
    fn test_large_integers_survive_storage() {
        let new_job = NewJob::from_args(&CountArgs { number: i64::MAX }).unwrap();
        let stored = serde_json::to_string(&new_job.args).unwrap();
        let job = job_with_args(serde_json::from_str(&stored).unwrap());
        let decoded: CountArgs = job.decode_args().unwrap();
        assert_eq!(decoded.number, i64::MAX);
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let job = job_with_args(json!({ "number": "five" }));
        assert!(job.decode_args::<CountArgs>().is_err());
    }

    #[test]
    fn test_attempt_limit_prefers_override() {
        let mut job = job_with_args(json!({ "number": 1 }));
        assert_eq!(job.attempt_limit(3), 3);
        job.max_attempts = Some(7);
        assert_eq!(job.attempt_limit(3), 7);
    }

    #[test]
    fn test_state_terminality() {
        assert!(!JobState::Available.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert_eq!(JobState::Running.to_string(), "running");
        assert_eq!(FailureCause::InvalidArgs.to_string(), "invalid_args");
    }
}
