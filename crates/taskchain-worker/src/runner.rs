//! Executor pool — claims due jobs and runs them in bounded parallel slots.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use taskchain_core::config::worker::WorkerConfig;
use taskchain_core::error::AppError;
use taskchain_core::result::AppResult;
use taskchain_entity::{AttemptError, Job};
use taskchain_store::JobStore;

use crate::context::JobContext;
use crate::executor::JobExecutionError;
use crate::policy::{Disposition, RetryPolicy};
use crate::registry::WorkerRegistry;

/// What happened to in-flight executions while the pool stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Executions that returned before the deadline.
    pub finished: usize,
    /// Executions dropped at the deadline; their jobs stay `running` until
    /// the queue's lease expires.
    pub abandoned: usize,
}

/// Bounded set of executor slots over a shared job store.
pub struct ExecutorPool {
    store: Arc<dyn JobStore>,
    registry: Arc<WorkerRegistry>,
    config: WorkerConfig,
    policy: RetryPolicy,
    slots: Arc<Semaphore>,
    span: Span,
}

impl std::fmt::Debug for ExecutorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorPool")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("available_slots", &self.slots.available_permits())
            .finish()
    }
}

impl ExecutorPool {
    /// Create a pool. Fails if the worker config is unusable.
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<WorkerRegistry>,
        config: WorkerConfig,
        span: Span,
    ) -> AppResult<Self> {
        config.validate()?;

        Ok(Self {
            store,
            registry,
            policy: RetryPolicy::from_config(&config),
            slots: Arc::new(Semaphore::new(config.max_concurrent_workers)),
            config,
            span,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Number of executions currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.config
            .max_concurrent_workers
            .saturating_sub(self.slots.available_permits())
    }

    /// Spawn the dispatch loop.
    pub fn start(self: Arc<Self>) -> PoolHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let abandon = CancellationToken::new();
        let task = tokio::spawn(self.run(stop_rx, abandon.clone()));

        PoolHandle {
            stop: stop_tx,
            abandon,
            task,
        }
    }

    /// Dispatch until stopped, then drain.
    async fn run(
        self: Arc<Self>,
        mut stop: watch::Receiver<bool>,
        abandon: CancellationToken,
    ) -> DrainReport {
        tracing::info!(
            parent: &self.span,
            max_concurrent_workers = self.config.max_concurrent_workers,
            per_job_timeout_secs = self.config.per_job_timeout_seconds,
            max_attempts = self.config.max_attempts,
            "Executor pool started"
        );

        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                self.log_join_error(joined);
            }
            if *stop.borrow() {
                break;
            }

            // Slot first, then claim: a job is never moved to `running`
            // without somewhere to run it.
            let permit = tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let claimed = tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
                claimed = self.store.claim_next_due(self.config.poll_interval()) => claimed,
            };

            match claimed {
                Ok(Some(job)) => {
                    let pool = Arc::clone(&self);
                    let cancel = abandon.child_token();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        let _ = pool.execute(job, cancel).await;
                    });
                }
                Ok(None) => {
                    tracing::trace!(parent: &self.span, "No due jobs");
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(parent: &self.span, error = %e, "Failed to claim job");
                    tokio::select! {
                        _ = stop.changed() => {}
                        _ = tokio::time::sleep(self.config.poll_interval()) => {}
                    }
                }
            }
        }

        self.drain(in_flight, abandon).await
    }

    /// Wait for in-flight executions until `abandon` fires, then drop the rest.
    async fn drain(&self, mut in_flight: JoinSet<()>, abandon: CancellationToken) -> DrainReport {
        let mut report = DrainReport::default();

        if !in_flight.is_empty() {
            tracing::info!(
                parent: &self.span,
                in_flight = in_flight.len(),
                "Executor pool stopping, waiting for in-flight jobs"
            );
        }

        loop {
            tokio::select! {
                biased;
                joined = in_flight.join_next() => match joined {
                    Some(joined) => {
                        self.log_join_error(joined);
                        report.finished += 1;
                    }
                    None => break,
                },
                _ = abandon.cancelled() => {
                    in_flight.abort_all();
                    while let Some(joined) = in_flight.join_next().await {
                        match joined {
                            Err(e) if e.is_cancelled() => report.abandoned += 1,
                            _ => report.finished += 1,
                        }
                    }
                    break;
                }
            }
        }

        tracing::info!(
            parent: &self.span,
            finished = report.finished,
            abandoned = report.abandoned,
            "Executor pool stopped"
        );
        report
    }

    fn log_join_error(&self, joined: Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            if !e.is_cancelled() {
                tracing::error!(parent: &self.span, error = %e, "Executor slot task failed");
            }
        }
    }

    /// Claim and run one due job inline, without the dispatch loop.
    ///
    /// Returns `None` when nothing is due. Used by test harnesses running
    /// with `test_only`.
    pub async fn process_next(&self) -> AppResult<Option<Job>> {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| AppError::service_unavailable("Executor pool is closed"))?;

        let Some(job) = self.store.claim_next_due(Duration::ZERO).await? else {
            return Ok(None);
        };

        self.execute(job, CancellationToken::new()).await.map(Some)
    }

    /// Run due jobs inline until none is left; returns how many ran.
    ///
    /// Retries scheduled in the future are not waited for.
    pub async fn run_until_idle(&self) -> AppResult<usize> {
        let mut processed = 0;
        while self.process_next().await?.is_some() {
            processed += 1;
        }
        Ok(processed)
    }

    /// Run one claimed job and record its outcome in the store.
    pub async fn execute(&self, job: Job, cancel: CancellationToken) -> AppResult<Job> {
        let span = tracing::info_span!(
            parent: &self.span,
            "job",
            job_id = %job.id,
            kind = %job.kind,
            attempt = job.attempt,
        );

        async move {
            let started = Instant::now();
            let outcome = self.invoke(&job, cancel).await;
            let duration_ms = millis(started.elapsed());

            self.report(job, outcome, duration_ms)
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Failed to record job outcome"))
        }
        .instrument(span)
        .await
    }

    async fn invoke(
        &self,
        job: &Job,
        cancel: CancellationToken,
    ) -> Result<Option<Value>, JobExecutionError> {
        let max_attempts = job.attempt_limit(self.config.max_attempts);
        // A lease can expire after the last attempt was claimed; the rescued
        // job comes back with its counter already past the limit.
        if job.attempt > max_attempts {
            tracing::warn!(max_attempts, "Job has no attempts left, not running it");
            return Err(JobExecutionError::Permanent(format!(
                "attempt {} exceeds the limit of {max_attempts}",
                job.attempt
            )));
        }

        let handler = self.registry.resolve(&job.kind)?;
        let ctx = JobContext::new(cancel, job.attempt, max_attempts);
        let timeout = self.config.per_job_timeout();

        tracing::info!(max_attempts, "Processing job");

        let execution = AssertUnwindSafe(handler.execute(&ctx, job)).catch_unwind();
        tokio::pin!(execution);

        match tokio::time::timeout(timeout, &mut execution).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => Err(JobExecutionError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => {
                ctx.cancel();
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Job exceeded its timeout, cancellation requested"
                );

                let grace = self.config.cancel_grace();
                if tokio::time::timeout(grace, &mut execution).await.is_err() {
                    tracing::warn!(
                        grace_ms = millis(grace),
                        "Job ignored cancellation, abandoning execution"
                    );
                }
                Err(JobExecutionError::Timeout(timeout))
            }
        }
    }

    async fn report(
        &self,
        job: Job,
        outcome: Result<Option<Value>, JobExecutionError>,
        duration_ms: u64,
    ) -> AppResult<Job> {
        let error = match outcome {
            Ok(result) => {
                let job = self.store.mark_completed(job.id, result).await?;
                tracing::info!(duration_ms, "Job completed");
                return Ok(job);
            }
            Err(error) => error,
        };

        let record = AttemptError::new(job.attempt, error.cause(), error.to_string());

        match self.policy.decide(&job, &error) {
            Disposition::Retry { at, delay } => {
                tracing::warn!(
                    error = %error,
                    cause = error.cause().as_str(),
                    retry_in_ms = millis(delay),
                    duration_ms,
                    "Job attempt failed, scheduled for retry"
                );
                self.store.mark_failed_retry(job.id, at, record).await
            }
            Disposition::Discard => {
                tracing::error!(
                    error = %error,
                    cause = error.cause().as_str(),
                    duration_ms,
                    "Job failed permanently"
                );
                self.store.mark_failed_permanent(job.id, record).await
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Control handle for a started pool.
#[derive(Debug)]
pub struct PoolHandle {
    stop: watch::Sender<bool>,
    abandon: CancellationToken,
    task: JoinHandle<DrainReport>,
}

impl PoolHandle {
    /// Stop claiming new jobs. In-flight executions keep running.
    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    /// Whether the dispatch loop and drain have both finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop claiming, wait up to `deadline` for in-flight executions, then
    /// abandon whatever is still running.
    pub async fn stop(mut self, deadline: Duration) -> AppResult<DrainReport> {
        self.request_stop();

        let joined = match tokio::time::timeout(deadline, &mut self.task).await {
            Ok(joined) => joined,
            Err(_) => {
                self.abandon.cancel();
                (&mut self.task).await
            }
        };

        joined.map_err(|e| AppError::internal(format!("Executor pool task failed: {e}")))
    }
}
