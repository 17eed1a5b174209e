//! Lifecycle controller: `stopped -> starting -> running -> stopping -> stopped`.
//!
//! [`Engine`] is the building phase: workers are registered and receive the
//! engine's [`ChainLink`]. [`Engine::start`] acquires the queue connection,
//! binds the link, checks every worker is wired and starts the pool,
//! returning a [`RunningEngine`]. Stopping consumes the running engine, so a
//! stopped engine cannot be used again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::Span;

use taskchain_core::config::AppConfig;
use taskchain_core::error::{AppError, ErrorKind};
use taskchain_core::result::AppResult;
use taskchain_store::{JobQueue, QueueConnection};

use crate::chain::ChainLink;
use crate::executor::Worker;
use crate::registry::WorkerRegistry;
use crate::runner::{DrainReport, ExecutorPool, PoolHandle};

/// Externally visible lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine being assembled; not yet connected to the queue.
pub struct Engine {
    config: AppConfig,
    registry: WorkerRegistry,
    chain: ChainLink,
    connection: Option<QueueConnection>,
    phase: watch::Sender<LifecyclePhase>,
    span: Span,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("phase", &*self.phase.borrow())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine. Every log line it and its pool emit is parented to
    /// `span`.
    pub fn new(config: AppConfig, span: Span) -> Self {
        let (phase, _) = watch::channel(LifecyclePhase::Stopped);
        Self {
            config,
            registry: WorkerRegistry::new(),
            chain: ChainLink::unbound(),
            connection: None,
            phase,
            span,
        }
    }

    /// Use an already open connection instead of connecting from config.
    pub fn with_connection(mut self, connection: QueueConnection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// The link chaining workers must hold; bound when the engine starts.
    pub fn chain_link(&self) -> ChainLink {
        self.chain.clone()
    }

    /// Register a worker. Duplicate kinds are configuration errors.
    pub fn register<W: Worker>(&mut self, worker: W) -> AppResult<()> {
        self.registry.register(worker)
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn phase(&self) -> LifecyclePhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<LifecyclePhase> {
        self.phase.subscribe()
    }

    /// Acquire resources, wire workers and start the executor pool.
    ///
    /// On error the engine is back in `stopped` and any connection it opened
    /// has been released.
    pub async fn start(self) -> AppResult<RunningEngine> {
        let Engine {
            config,
            registry,
            chain,
            connection,
            phase,
            span,
        } = self;

        phase.send_replace(LifecyclePhase::Starting);
        tracing::info!(parent: &span, workers = registry.len(), "Starting engine");

        if let Err(e) = config.validate() {
            phase.send_replace(LifecyclePhase::Stopped);
            return Err(e);
        }

        let connection = match connection {
            Some(connection) => connection,
            None => match QueueConnection::connect(&config.queue).await {
                Ok(connection) => connection,
                Err(e) => {
                    phase.send_replace(LifecyclePhase::Stopped);
                    return Err(e);
                }
            },
        };

        let queue = JobQueue::new(connection.store());
        let wired = wire(&registry, &chain, &queue).and_then(|()| {
            ExecutorPool::new(
                connection.store(),
                Arc::new(registry),
                config.worker.clone(),
                span.clone(),
            )
        });

        let pool = match wired {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    tracing::warn!(parent: &span, error = %close_err, "Failed to release queue connection");
                }
                phase.send_replace(LifecyclePhase::Stopped);
                return Err(e);
            }
        };

        if pool.registry().is_empty() {
            tracing::warn!(parent: &span, "No workers registered; every job will be unroutable");
        }

        let handle = if config.worker.test_only {
            tracing::info!(parent: &span, "test_only is set, dispatch loop not started");
            None
        } else {
            Some(Arc::clone(&pool).start())
        };

        phase.send_replace(LifecyclePhase::Running);
        tracing::info!(
            parent: &span,
            kinds = ?pool.registry().kinds(),
            "Engine running"
        );

        Ok(RunningEngine {
            config,
            queue,
            pool,
            handle,
            connection,
            phase,
            span,
        })
    }
}

fn wire(registry: &WorkerRegistry, chain: &ChainLink, queue: &JobQueue) -> AppResult<()> {
    chain.bind(Arc::new(queue.clone()))?;
    registry.ensure_ready()
}

/// A started engine.
pub struct RunningEngine {
    config: AppConfig,
    queue: JobQueue,
    pool: Arc<ExecutorPool>,
    handle: Option<PoolHandle>,
    connection: QueueConnection,
    phase: watch::Sender<LifecyclePhase>,
    span: Span,
}

impl std::fmt::Debug for RunningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningEngine")
            .field("phase", &*self.phase.borrow())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl RunningEngine {
    /// Client for enqueuing jobs.
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn pool(&self) -> &Arc<ExecutorPool> {
        &self.pool
    }

    pub fn phase(&self) -> LifecyclePhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<LifecyclePhase> {
        self.phase.subscribe()
    }

    /// Stop with the configured shutdown deadline.
    pub async fn shutdown(self) -> AppResult<DrainReport> {
        let deadline = self.config.worker.shutdown_timeout();
        self.stop(deadline).await
    }

    /// Stop claiming jobs, drain in-flight executions within `deadline` and
    /// release the queue connection.
    ///
    /// Executions still running at the deadline are abandoned and their
    /// jobs stay `running` until the queue's lease expires. That is reported
    /// in the [`DrainReport`], not as an error.
    pub async fn stop(self, deadline: Duration) -> AppResult<DrainReport> {
        let RunningEngine {
            handle,
            connection,
            phase,
            span,
            ..
        } = self;

        phase.send_replace(LifecyclePhase::Stopping);
        tracing::info!(parent: &span, ?deadline, "Stopping engine");

        let drained = match handle {
            Some(handle) => handle.stop(deadline).await,
            None => Ok(DrainReport::default()),
        };
        let closed = connection.close().await;

        phase.send_replace(LifecyclePhase::Stopped);

        let report = drained?;
        closed.map_err(|e| {
            AppError::with_source(
                ErrorKind::ServiceUnavailable,
                "Failed to release queue connection",
                e,
            )
        })?;

        if report.abandoned > 0 {
            tracing::warn!(
                parent: &span,
                abandoned = report.abandoned,
                "Abandoned in-flight jobs at the shutdown deadline; they will be retried after their lease expires"
            );
        }
        tracing::info!(parent: &span, finished = report.finished, "Engine stopped");
        Ok(report)
    }
}
