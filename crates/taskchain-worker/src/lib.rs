//! Job execution and chaining core for taskchain.
//!
//! This crate provides:
//! - The [`Worker`] contract and the kind-keyed [`WorkerRegistry`]
//! - [`ChainLink`], the capability a worker uses to enqueue follow-up jobs
//! - The [`ExecutorPool`] that claims, runs, retries and times out jobs
//! - The [`Engine`] lifecycle controller (start, drain, stop)
//! - The demo arithmetic workers in [`jobs`]

pub mod chain;
pub mod context;
pub mod executor;
pub mod jobs;
pub mod lifecycle;
pub mod policy;
pub mod registry;
pub mod runner;

pub use chain::{ChainDispatcher, ChainLink};
pub use context::JobContext;
pub use executor::{JobExecutionError, JobHandler, TypedHandler, Worker};
pub use lifecycle::{Engine, LifecyclePhase, RunningEngine};
pub use policy::{Disposition, RetryPolicy};
pub use registry::WorkerRegistry;
pub use runner::{DrainReport, ExecutorPool, PoolHandle};
