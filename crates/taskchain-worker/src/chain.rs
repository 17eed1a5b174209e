//! Job chaining — the capability a worker uses to enqueue follow-up jobs.
//!
//! Workers hold a [`ChainLink`], never the queue client itself. A link is
//! created unbound while workers are built, bound once to the queue client
//! by the lifecycle controller, and [`WorkerRegistry::ensure_ready`]
//! refuses to start the pool while any registered worker's link is unbound.
//!
//! Chaining is an ordinary enqueue: the child becomes visible independently
//! of the parent's completion, so a parent that is retried after chaining
//! enqueues its child again (at-least-once chaining).
//!
//! [`WorkerRegistry::ensure_ready`]: crate::registry::WorkerRegistry::ensure_ready

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use taskchain_core::error::AppError;
use taskchain_entity::{Job, JobArgs, NewJob};
use taskchain_store::JobQueue;

use crate::executor::JobExecutionError;

/// Enqueue one job, scheduled immediately.
///
/// Either the job is fully registered with the queue or the call fails and
/// nothing was enqueued.
#[async_trait]
pub trait ChainDispatcher: Send + Sync {
    async fn dispatch(&self, job: NewJob) -> Result<Job, AppError>;
}

#[async_trait]
impl ChainDispatcher for JobQueue {
    async fn dispatch(&self, job: NewJob) -> Result<Job, AppError> {
        self.insert_raw(job).await
    }
}

/// Late-bound handle to a [`ChainDispatcher`].
#[derive(Clone, Default)]
pub struct ChainLink {
    slot: Arc<OnceLock<Arc<dyn ChainDispatcher>>>,
}

impl std::fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainLink")
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl ChainLink {
    /// A link that must be bound before the pool starts.
    pub fn unbound() -> Self {
        Self::default()
    }

    /// A link bound from the start, e.g. to a fake dispatcher in tests.
    pub fn bound_to(dispatcher: Arc<dyn ChainDispatcher>) -> Self {
        let link = Self::unbound();
        let _ = link.slot.set(dispatcher);
        link
    }

    /// Bind the link. Every clone of the link observes the binding.
    pub fn bind(&self, dispatcher: Arc<dyn ChainDispatcher>) -> Result<(), AppError> {
        self.slot
            .set(dispatcher)
            .map_err(|_| AppError::configuration("Chain link is already bound"))
    }

    pub fn is_bound(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Enqueue a follow-up job with typed arguments.
    ///
    /// Failures come back as [`JobExecutionError::Chain`] so the calling
    /// worker can propagate them with `?` and fail its own attempt.
    pub async fn enqueue<A: JobArgs>(&self, args: &A) -> Result<Job, JobExecutionError> {
        let dispatcher = self.slot.get().ok_or_else(|| {
            JobExecutionError::Chain(AppError::internal(
                "Chain link used before the queue client was bound",
            ))
        })?;

        let new_job = NewJob::from_args(args).map_err(|e| JobExecutionError::Chain(e.into()))?;
        dispatcher
            .dispatch(new_job)
            .await
            .map_err(JobExecutionError::Chain)
    }
}
