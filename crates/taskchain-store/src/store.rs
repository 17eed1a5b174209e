//! The persistent queue contract.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use taskchain_core::result::AppResult;
use taskchain_entity::{AttemptError, Job, JobId, JobState, NewJob};

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only jobs of this kind.
    pub kind: Option<String>,
    /// Only jobs in this state.
    pub state: Option<JobState>,
}

impl JobFilter {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            state: None,
        }
    }

    pub fn state(state: JobState) -> Self {
        Self {
            kind: None,
            state: Some(state),
        }
    }

    /// Check whether a job passes this filter.
    pub fn matches(&self, job: &Job) -> bool {
        self.kind.as_deref().is_none_or(|k| job.kind == k)
            && self.state.is_none_or(|s| job.state == s)
    }
}

/// Storage and lease semantics the executor pool depends on.
///
/// Implementations must be safe to share between every executor slot; the
/// pool never adds locking of its own around these calls.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Store a new job in the `available` state and assign its id.
    ///
    /// Either the job is fully visible to claimers afterwards or the call
    /// fails and nothing was stored.
    async fn enqueue(&self, job: NewJob) -> AppResult<Job>;

    /// Claim the next due job, waiting up to `wait` for one to appear.
    ///
    /// The returned job is `running`, owned exclusively by the caller until
    /// its lease expires, and has its attempt counter incremented.
    async fn claim_next_due(&self, wait: Duration) -> AppResult<Option<Job>>;

    /// `running -> completed`.
    async fn mark_completed(&self, id: JobId, result: Option<Value>) -> AppResult<Job>;

    /// `running -> available`, due again at `next_attempt_at`.
    async fn mark_failed_retry(
        &self,
        id: JobId,
        next_attempt_at: DateTime<Utc>,
        error: AttemptError,
    ) -> AppResult<Job>;

    /// `running -> failed`.
    async fn mark_failed_permanent(&self, id: JobId, error: AttemptError) -> AppResult<Job>;

    /// Fetch a job by id.
    async fn get(&self, id: JobId) -> AppResult<Option<Job>>;

    /// List jobs matching a filter, oldest first.
    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<Job>>;

    /// Count jobs in a state.
    async fn count_by_state(&self, state: JobState) -> AppResult<usize>;

    /// Release the underlying resource. Later calls fail.
    async fn close(&self) -> AppResult<()>;
}
