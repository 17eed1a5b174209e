//! # taskchain-store
//!
//! The contract the executor pool requires from a persistent queue
//! ([`JobStore`]), an in-process reference implementation of it
//! ([`MemoryJobStore`]), connection handling keyed on the configured queue
//! URL, and the typed [`JobQueue`] client used to enqueue jobs.

pub mod connection;
pub mod memory;
pub mod queue;
pub mod store;

pub use connection::QueueConnection;
pub use memory::MemoryJobStore;
pub use queue::{InsertOptions, JobQueue, QueueStats};
pub use store::{JobFilter, JobStore};
