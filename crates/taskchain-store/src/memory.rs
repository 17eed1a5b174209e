//! In-process reference implementation of [`JobStore`].
//!
//! Jobs live in a map guarded by an async mutex; claimers park on a
//! [`Notify`] and are woken on every enqueue or reschedule. Nothing survives
//! the process, so this store only provides the lease/recovery semantics,
//! not durability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use taskchain_core::error::AppError;
use taskchain_core::result::AppResult;
use taskchain_entity::{AttemptError, Job, JobId, JobState, NewJob};

use crate::store::{JobFilter, JobStore};

/// Upper bound on how long a parked claimer sleeps before re-checking
/// scheduled jobs.
const MAX_PARK: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct StoreState {
    jobs: HashMap<JobId, Job>,
}

impl StoreState {
    /// Return expired leases to `available`.
    fn rescue_expired(&mut self, now: DateTime<Utc>) {
        for job in self.jobs.values_mut() {
            if job.state == JobState::Running
                && job.lease_expires_at.is_some_and(|deadline| deadline <= now)
            {
                tracing::warn!(
                    job_id = %job.id,
                    kind = %job.kind,
                    attempt = job.attempt,
                    "Lease expired, returning job to the queue"
                );
                job.state = JobState::Available;
                job.lease_expires_at = None;
            }
        }
    }

    /// Earliest-scheduled due job; ties broken by id (creation order).
    fn next_due(&self, now: DateTime<Utc>) -> Option<JobId> {
        self.jobs
            .values()
            .filter(|job| job.state == JobState::Available && job.scheduled_at <= now)
            .min_by_key(|job| (job.scheduled_at, job.id))
            .map(|job| job.id)
    }

    /// Time until the next scheduled job or lease expiry, if any.
    fn next_wakeup(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.jobs
            .values()
            .filter_map(|job| match job.state {
                JobState::Available => Some(job.scheduled_at),
                JobState::Running => job.lease_expires_at,
                _ => None,
            })
            .min()
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
    }

    fn running_mut(&mut self, id: JobId) -> AppResult<&mut Job> {
        let job = self
            .jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;

        if job.state != JobState::Running {
            return Err(AppError::conflict(format!(
                "Job {id} is {}, only running jobs can be transitioned",
                job.state
            )));
        }
        Ok(job)
    }
}

/// In-memory job store.
#[derive(Debug)]
pub struct MemoryJobStore {
    state: Mutex<StoreState>,
    notify: Notify,
    lease: Duration,
    closed: AtomicBool,
}

impl MemoryJobStore {
    /// Create an empty store whose claims are leased for `lease`.
    pub fn new(lease: Duration) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            notify: Notify::new(),
            lease,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::service_unavailable("Job store is closed"));
        }
        Ok(())
    }

    async fn try_claim(&self) -> AppResult<Result<Job, Option<Duration>>> {
        self.ensure_open()?;

        let now = Utc::now();
        let mut state = self.state.lock().await;
        state.rescue_expired(now);

        let Some(id) = state.next_due(now) else {
            return Ok(Err(state.next_wakeup(now)));
        };

        let lease = chrono::Duration::from_std(self.lease)
            .map_err(|e| AppError::internal(format!("Invalid lease duration: {e}")))?;

        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::internal(format!("Job {id} vanished during claim")))?;
        job.state = JobState::Running;
        job.attempt += 1;
        job.attempted_at = Some(now);
        job.lease_expires_at = Some(now + lease);

        Ok(Ok(job.clone()))
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, new_job: NewJob) -> AppResult<Job> {
        self.ensure_open()?;

        if new_job.kind.is_empty() {
            return Err(AppError::validation("Job kind must not be empty"));
        }
        if new_job.max_attempts == Some(0) {
            return Err(AppError::validation("max_attempts must be at least 1"));
        }

        let now = Utc::now();
        let job = Job {
            id: JobId::new(),
            kind: new_job.kind,
            args: new_job.args,
            state: JobState::Available,
            attempt: 0,
            max_attempts: new_job.max_attempts,
            scheduled_at: new_job.scheduled_at.unwrap_or(now),
            attempted_at: None,
            lease_expires_at: None,
            finalized_at: None,
            result: None,
            errors: Vec::new(),
            created_at: now,
        };

        self.state.lock().await.jobs.insert(job.id, job.clone());
        self.notify.notify_waiters();

        tracing::debug!(job_id = %job.id, kind = %job.kind, "Enqueued job");
        Ok(job)
    }

    async fn claim_next_due(&self, wait: Duration) -> AppResult<Option<Job>> {
        let deadline = Instant::now() + wait;

        loop {
            // Registered before checking so an enqueue between the check and
            // the park is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_wakeup = match self.try_claim().await? {
                Ok(job) => {
                    tracing::debug!(
                        job_id = %job.id,
                        kind = %job.kind,
                        attempt = job.attempt,
                        "Claimed job"
                    );
                    return Ok(Some(job));
                }
                Err(next_wakeup) => next_wakeup,
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let park = next_wakeup.unwrap_or(MAX_PARK).min(MAX_PARK);
            let wake_at = (now + park).min(deadline);

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn mark_completed(&self, id: JobId, result: Option<Value>) -> AppResult<Job> {
        self.ensure_open()?;

        let mut state = self.state.lock().await;
        let job = state.running_mut(id)?;
        job.state = JobState::Completed;
        job.result = result;
        job.lease_expires_at = None;
        job.finalized_at = Some(Utc::now());

        Ok(job.clone())
    }

    async fn mark_failed_retry(
        &self,
        id: JobId,
        next_attempt_at: DateTime<Utc>,
        error: AttemptError,
    ) -> AppResult<Job> {
        self.ensure_open()?;

        let job = {
            let mut state = self.state.lock().await;
            let job = state.running_mut(id)?;
            job.state = JobState::Available;
            job.scheduled_at = next_attempt_at;
            job.lease_expires_at = None;
            job.errors.push(error);
            job.clone()
        };

        self.notify.notify_waiters();
        Ok(job)
    }

    async fn mark_failed_permanent(&self, id: JobId, error: AttemptError) -> AppResult<Job> {
        self.ensure_open()?;

        let mut state = self.state.lock().await;
        let job = state.running_mut(id)?;
        job.state = JobState::Failed;
        job.lease_expires_at = None;
        job.finalized_at = Some(Utc::now());
        job.errors.push(error);

        Ok(job.clone())
    }

    async fn get(&self, id: JobId) -> AppResult<Option<Job>> {
        self.ensure_open()?;
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn list(&self, filter: &JobFilter) -> AppResult<Vec<Job>> {
        self.ensure_open()?;

        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    async fn count_by_state(&self, job_state: JobState) -> AppResult<usize> {
        self.ensure_open()?;

        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.state == job_state)
            .count())
    }

    async fn close(&self) -> AppResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(AppError::service_unavailable("Job store already closed"));
        }
        self.notify.notify_waiters();
        tracing::info!("In-memory job store closed");
        Ok(())
    }
}
