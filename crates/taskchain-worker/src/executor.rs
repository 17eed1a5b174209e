//! Worker contract — what a job kind's executor must implement.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use taskchain_core::error::AppError;
use taskchain_entity::{FailureCause, Job, JobArgs};

use crate::context::JobContext;

/// Error from job execution
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// The worker failed; the attempt may be retried.
    #[error("Job failed: {0}")]
    Failed(String),

    /// The worker failed in a way that will never succeed — do not retry.
    #[error("Permanent job failure: {0}")]
    Permanent(String),

    /// Enqueuing a follow-up job failed; the parent attempt fails with it.
    #[error("Failed to enqueue chained job: {0}")]
    Chain(#[source] AppError),

    /// The execution exceeded the per-job timeout.
    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    /// The worker panicked.
    #[error("Job panicked: {0}")]
    Panicked(String),

    /// The stored arguments do not match the worker's argument type.
    #[error("Invalid job arguments: {0}")]
    InvalidArgs(String),

    /// No worker is registered for the job's kind.
    #[error("No worker registered for job kind '{0}'")]
    Unroutable(String),
}

impl JobExecutionError {
    /// Convenience constructor for the common retryable case.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Failed(_) | Self::Chain(_) | Self::Timeout(_) | Self::Panicked(_)
        )
    }

    /// Tag recorded in the job's error history.
    pub fn cause(&self) -> FailureCause {
        match self {
            Self::Failed(_) => FailureCause::Error,
            Self::Permanent(_) => FailureCause::Permanent,
            Self::Chain(_) => FailureCause::Chain,
            Self::Timeout(_) => FailureCause::Timeout,
            Self::Panicked(_) => FailureCause::Panic,
            Self::InvalidArgs(_) => FailureCause::InvalidArgs,
            Self::Unroutable(_) => FailureCause::Unroutable,
        }
    }
}

/// Object-safe executor for one job kind, as stored in the registry.
///
/// Most code implements [`Worker`] instead and lets [`TypedHandler`] do the
/// argument decoding.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Get the job kind this handler processes
    fn kind(&self) -> &str;

    /// Whether every capability the handler depends on has been wired.
    fn is_ready(&self) -> bool {
        true
    }

    /// Execute the job, returning an optional result value on success.
    async fn execute(&self, ctx: &JobContext, job: &Job)
    -> Result<Option<Value>, JobExecutionError>;
}

/// Typed executor for the job kind named by `Self::Args::KIND`.
///
/// Implementations must tolerate concurrent calls: several jobs of the same
/// kind may run at once.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Argument type; its `KIND` is the kind this worker is registered under.
    type Args: JobArgs;

    /// Whether every capability the worker depends on has been wired.
    fn is_ready(&self) -> bool {
        true
    }

    /// Run one attempt with already decoded arguments.
    async fn work(
        &self,
        ctx: &JobContext,
        job: &Job,
        args: Self::Args,
    ) -> Result<Option<Value>, JobExecutionError>;
}

/// Adapts a [`Worker`] to the [`JobHandler`] interface.
#[derive(Debug)]
pub struct TypedHandler<W> {
    worker: W,
}

impl<W: Worker> TypedHandler<W> {
    pub fn new(worker: W) -> Self {
        Self { worker }
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }
}

#[async_trait]
impl<W: Worker> JobHandler for TypedHandler<W> {
    fn kind(&self) -> &str {
        W::Args::KIND
    }

    fn is_ready(&self) -> bool {
        self.worker.is_ready()
    }

    async fn execute(
        &self,
        ctx: &JobContext,
        job: &Job,
    ) -> Result<Option<Value>, JobExecutionError> {
        let args: W::Args = job.decode_args().map_err(|e| {
            JobExecutionError::InvalidArgs(format!("{} arguments: {}", W::Args::KIND, e))
        })?;

        self.worker.work(ctx, job, args).await
    }
}
