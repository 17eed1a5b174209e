//! Retry policy: what happens to a job after a failed attempt.

use std::time::Duration;

use chrono::{DateTime, Utc};

use taskchain_core::config::worker::WorkerConfig;
use taskchain_entity::Job;

use crate::executor::JobExecutionError;

/// Outcome of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Make the job available again at `at`.
    Retry { at: DateTime<Utc>, delay: Duration },
    /// Fail the job permanently.
    Discard,
}

/// Attempt limit plus exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Default attempt limit for jobs without their own override.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
        }
    }

    /// Delay after the given failed attempt: `base * 2^(attempt - 1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decide what to do with `job` after its current attempt failed.
    pub fn decide(&self, job: &Job, error: &JobExecutionError) -> Disposition {
        if !error.is_retryable() || job.attempt >= job.attempt_limit(self.max_attempts) {
            return Disposition::Discard;
        }

        let delay = self.backoff(job.attempt);
        let at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));
        Disposition::Retry { at, delay }
    }
}
