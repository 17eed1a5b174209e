//! # taskchain-entity
//!
//! Domain entities shared by the queue and the executor pool: jobs, their
//! states, their attempt history and the [`JobArgs`] contract that ties a
//! payload type to its stable kind string.

pub mod job;

pub use job::{AttemptError, FailureCause, Job, JobArgs, JobId, JobState, NewJob};
