//! Shared test helpers for integration tests.

use std::time::Duration;

use tracing::Span;

use taskchain_core::config::AppConfig;
use taskchain_entity::{Job, JobId};
use taskchain_store::{JobFilter, JobQueue, QueueStats};
use taskchain_worker::jobs::register_demo_workers;
use taskchain_worker::{Engine, RunningEngine};

/// Fast config for tests: short polls, immediate retries.
pub fn test_config(test_only: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.worker.test_only = test_only;
    config.worker.poll_interval_ms = 10;
    config.worker.cancel_grace_ms = 10;
    config.worker.retry_base_delay_ms = 0;
    config
}

/// Start an engine with the demo workers registered.
pub async fn start_demo_engine(config: AppConfig) -> RunningEngine {
    let mut engine = Engine::new(config, Span::none());
    register_demo_workers(&mut engine).expect("Failed to register demo workers");
    engine.start().await.expect("Engine failed to start")
}

/// Poll queue stats until `done` holds, failing the test after five seconds.
pub async fn wait_for_stats(queue: &JobQueue, what: &str, done: impl Fn(&QueueStats) -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let stats = queue.stats().await.expect("Failed to read queue stats");
            if done(&stats) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    if waited.is_err() {
        panic!("Timed out waiting for {what}");
    }
}

/// Every job of one kind, oldest first.
pub async fn jobs_of_kind(queue: &JobQueue, kind: &str) -> Vec<Job> {
    queue
        .store()
        .list(&JobFilter::kind(kind))
        .await
        .expect("Failed to list jobs")
}

/// Current state of a job.
pub async fn fetch(queue: &JobQueue, id: JobId) -> Job {
    queue
        .store()
        .get(id)
        .await
        .expect("Failed to read job")
        .expect("Job disappeared")
}
