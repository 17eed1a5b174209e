//! Integration tests for engine startup and shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::Span;

use taskchain_core::config::AppConfig;
use taskchain_core::error::ErrorKind;
use taskchain_entity::{Job, JobArgs, JobState};
use taskchain_worker::jobs::{MultiplyTwoWorker, register_demo_workers};
use taskchain_worker::{
    ChainLink, DrainReport, Engine, JobContext, JobExecutionError, LifecyclePhase, Worker,
};

use crate::helpers::{fetch, test_config, wait_for_stats};

#[derive(Serialize, Deserialize)]
struct GateArgs {
    label: String,
}

impl JobArgs for GateArgs {
    const KIND: &'static str = "gate";
}

/// Blocks every execution until released.
#[derive(Default)]
struct Gate {
    started: AtomicUsize,
    finished: AtomicUsize,
    release: Notify,
}

struct GateWorker(Arc<Gate>);

#[async_trait]
impl Worker for GateWorker {
    type Args = GateArgs;

    async fn work(
        &self,
        _ctx: &JobContext,
        _job: &Job,
        _args: GateArgs,
    ) -> Result<Option<Value>, JobExecutionError> {
        self.0.started.fetch_add(1, Ordering::SeqCst);
        self.0.release.notified().await;
        self.0.finished.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

fn gate(label: &str) -> GateArgs {
    GateArgs {
        label: label.to_string(),
    }
}

async fn start_gated_engine(gate: &Arc<Gate>) -> taskchain_worker::RunningEngine {
    let mut engine = Engine::new(test_config(false), Span::none());
    engine.register(GateWorker(Arc::clone(gate))).unwrap();
    engine.start().await.unwrap()
}

#[tokio::test]
async fn test_stopping_claims_nothing_new_and_drains_running() {
    let gate_state = Arc::new(Gate::default());
    let running = start_gated_engine(&gate_state).await;
    let queue = running.queue().clone();
    let mut phases = running.subscribe_phase();

    queue.insert(&gate("first")).await.unwrap();
    wait_for_stats(&queue, "first job to be claimed", |s| s.running == 1).await;

    let stopping = tokio::spawn(running.stop(Duration::from_secs(5)));
    phases
        .wait_for(|phase| *phase == LifecyclePhase::Stopping)
        .await
        .unwrap();

    let late = queue.insert(&gate("late")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(fetch(&queue, late.id).await.state, JobState::Available);
    assert_eq!(gate_state.started.load(Ordering::SeqCst), 1);
    assert!(!stopping.is_finished());

    gate_state.release.notify_one();
    let report = stopping.await.unwrap().unwrap();

    assert_eq!(report, DrainReport { finished: 1, abandoned: 0 });
    assert_eq!(gate_state.finished.load(Ordering::SeqCst), 1);
    assert_eq!(gate_state.started.load(Ordering::SeqCst), 1);
    assert_eq!(*phases.borrow(), LifecyclePhase::Stopped);
}

#[tokio::test]
async fn test_deadline_abandons_running_jobs() {
    let gate_state = Arc::new(Gate::default());
    let running = start_gated_engine(&gate_state).await;
    let queue = running.queue().clone();
    let phases = running.subscribe_phase();

    queue.insert(&gate("stuck")).await.unwrap();
    wait_for_stats(&queue, "stuck job to be claimed", |s| s.running == 1).await;

    let report = running.stop(Duration::from_millis(100)).await.unwrap();

    assert_eq!(report, DrainReport { finished: 0, abandoned: 1 });
    assert_eq!(gate_state.finished.load(Ordering::SeqCst), 0);
    assert_eq!(*phases.borrow(), LifecyclePhase::Stopped);
}

#[tokio::test]
async fn test_duplicate_kind_is_a_configuration_error() {
    let mut engine = Engine::new(test_config(true), Span::none());
    register_demo_workers(&mut engine).unwrap();

    let err = register_demo_workers(&mut engine).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert!(err.is_fatal_at_startup());
    assert_eq!(engine.phase(), LifecyclePhase::Stopped);
}

#[tokio::test]
async fn test_unbound_chain_link_refuses_start() {
    let mut engine = Engine::new(test_config(true), Span::none());
    engine
        .register(MultiplyTwoWorker::new(ChainLink::unbound()))
        .unwrap();
    let phases = engine.subscribe_phase();

    let err = engine.start().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert!(err.message.contains("multiply_two"));
    assert_eq!(*phases.borrow(), LifecyclePhase::Stopped);
}

#[tokio::test]
async fn test_engine_from_toml_config() {
    let config = AppConfig::from_toml_str(
        r#"
        [worker]
        max_concurrent_workers = 4
        test_only = true

        [queue]
        url = "memory://"
        "#,
    )
    .unwrap();
    assert_eq!(config.worker.max_concurrent_workers, 4);

    let mut engine = Engine::new(config, Span::none());
    register_demo_workers(&mut engine).unwrap();
    let running = engine.start().await.unwrap();
    assert_eq!(running.phase(), LifecyclePhase::Running);

    let report = running.shutdown().await.unwrap();
    assert_eq!(report, DrainReport::default());
}

#[test]
fn test_zero_workers_rejected() {
    let err = AppConfig::from_toml_str(
        r#"
        [worker]
        max_concurrent_workers = 0
        "#,
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
}
