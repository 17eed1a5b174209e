//! Typed client for enqueuing jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskchain_core::error::AppError;
use taskchain_entity::{Job, JobArgs, JobState, NewJob};

use crate::store::JobStore;

/// Options applied when inserting a job.
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    /// Run no earlier than this time.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Override the pool's attempt limit.
    pub max_attempts: Option<u32>,
}

/// Job queue client shared by callers and by chaining workers.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue").finish_non_exhaustive()
    }
}

impl JobQueue {
    /// Create a new job queue client
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Enqueue a job, due immediately.
    pub async fn insert<A: JobArgs>(&self, args: &A) -> Result<Job, AppError> {
        self.insert_with(args, InsertOptions::default()).await
    }

    /// Enqueue a job with explicit options.
    pub async fn insert_with<A: JobArgs>(
        &self,
        args: &A,
        options: InsertOptions,
    ) -> Result<Job, AppError> {
        let mut new_job = NewJob::from_args(args)?;
        new_job.scheduled_at = options.scheduled_at;
        new_job.max_attempts = options.max_attempts;
        self.insert_raw(new_job).await
    }

    /// Enqueue an already serialized job.
    pub async fn insert_raw(&self, new_job: NewJob) -> Result<Job, AppError> {
        let job = self.store.enqueue(new_job).await?;

        tracing::debug!(
            job_id = %job.id,
            kind = %job.kind,
            scheduled_at = %job.scheduled_at,
            "Inserted job"
        );
        Ok(job)
    }

    /// Return the underlying store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Get queue statistics
    pub async fn stats(&self) -> Result<QueueStats, AppError> {
        Ok(QueueStats {
            available: self.store.count_by_state(JobState::Available).await?,
            running: self.store.count_by_state(JobState::Running).await?,
            completed: self.store.count_by_state(JobState::Completed).await?,
            failed: self.store.count_by_state(JobState::Failed).await?,
        })
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs waiting to run, including scheduled retries.
    pub available: usize,
    /// Jobs currently claimed.
    pub running: usize,
    /// Jobs that succeeded.
    pub completed: usize,
    /// Jobs that failed permanently.
    pub failed: usize,
}
