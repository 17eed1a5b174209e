//! Executor pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Executor pool, retry and shutdown settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum number of job executions in flight, across all kinds.
    #[serde(default = "default_max_concurrent_workers")]
    pub max_concurrent_workers: usize,
    /// Upper bound for a single execution, in seconds.
    #[serde(default = "default_per_job_timeout")]
    pub per_job_timeout_seconds: u64,
    /// Attempts allowed before a job is failed permanently.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Disable the dispatch loop; jobs are only processed when a test drives the pool.
    #[serde(default)]
    pub test_only: bool,
    /// How long a claim waits for a due job before the loop re-checks for shutdown.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// How long a timed-out execution may keep running after its cancellation signal.
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace_ms: u64,
    /// Delay before the first retry; doubled on every further attempt.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    /// Cap for the retry delay, in seconds.
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_seconds: u64,
    /// Drain deadline used when stopping, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: default_max_concurrent_workers(),
            per_job_timeout_seconds: default_per_job_timeout(),
            max_attempts: default_max_attempts(),
            test_only: false,
            poll_interval_ms: default_poll_interval(),
            cancel_grace_ms: default_cancel_grace(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_seconds: default_retry_max_delay(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl WorkerConfig {
    pub fn per_job_timeout(&self) -> Duration {
        Duration::from_secs(self.per_job_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_secs(self.retry_max_delay_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Reject settings the executor pool cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_concurrent_workers == 0 {
            return Err(AppError::configuration(
                "worker.max_concurrent_workers must be at least 1",
            ));
        }
        if self.max_attempts == 0 {
            return Err(AppError::configuration(
                "worker.max_attempts must be at least 1",
            ));
        }
        if self.per_job_timeout_seconds == 0 {
            return Err(AppError::configuration(
                "worker.per_job_timeout_seconds must be greater than 0",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(AppError::configuration(
                "worker.poll_interval_ms must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn default_max_concurrent_workers() -> usize {
    10
}

fn default_per_job_timeout() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_cancel_grace() -> u64 {
    1000
}

fn default_retry_base_delay() -> u64 {
    1000
}

fn default_retry_max_delay() -> u64 {
    3600
}

fn default_shutdown_timeout() -> u64 {
    10
}
