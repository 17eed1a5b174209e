//! Worker registry — maps job kinds to their handlers.
//!
//! Filled while the engine is being built and frozen behind an `Arc` once
//! the executor pool exists, so reads need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use taskchain_core::error::AppError;

use crate::executor::{JobExecutionError, JobHandler, TypedHandler, Worker};

/// Kind-keyed set of job handlers.
#[derive(Default)]
pub struct WorkerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl WorkerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed worker under `W::Args::KIND`.
    pub fn register<W: Worker>(&mut self, worker: W) -> Result<(), AppError> {
        self.register_handler(Arc::new(TypedHandler::new(worker)))
    }

    /// Register a handler. A kind can only be registered once.
    pub fn register_handler(&mut self, handler: Arc<dyn JobHandler>) -> Result<(), AppError> {
        let kind = handler.kind().to_string();

        if kind.is_empty() {
            return Err(AppError::configuration(
                "Cannot register a worker with an empty job kind",
            ));
        }
        if self.handlers.contains_key(&kind) {
            return Err(AppError::configuration(format!(
                "A worker is already registered for job kind '{kind}'"
            )));
        }

        tracing::info!(kind = %kind, "Registered worker");
        self.handlers.insert(kind, handler);
        Ok(())
    }

    /// Look up the handler for a kind.
    ///
    /// An unknown kind is unroutable: it will never become known while the
    /// process runs, so the error is not retryable.
    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn JobHandler>, JobExecutionError> {
        self.handlers
            .get(kind)
            .cloned()
            .ok_or_else(|| JobExecutionError::Unroutable(kind.to_string()))
    }

    /// Check if a handler is registered for a kind
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Fail if any registered handler still has unwired capabilities.
    pub fn ensure_ready(&self) -> Result<(), AppError> {
        let mut unready: Vec<&str> = self
            .handlers
            .iter()
            .filter(|(_, handler)| !handler.is_ready())
            .map(|(kind, _)| kind.as_str())
            .collect();

        if unready.is_empty() {
            return Ok(());
        }

        unready.sort_unstable();
        Err(AppError::configuration(format!(
            "Workers not fully wired before start: {}",
            unready.join(", ")
        )))
    }
}
