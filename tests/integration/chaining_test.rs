//! Integration tests for job chaining through the demo workers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::Span;

use taskchain_core::error::AppError;
use taskchain_entity::{FailureCause, Job, JobArgs, JobState, NewJob};
use taskchain_store::JobFilter;
use taskchain_worker::jobs::{
    AddOneArgs, AddOneWorker, AddThreeArgs, AddThreeWorker, MultiplyTwoArgs, MultiplyTwoWorker,
    seed_demo_batch,
};
use taskchain_worker::{
    ChainDispatcher, ChainLink, Engine, JobContext, JobExecutionError, Worker,
};

use crate::helpers::{fetch, jobs_of_kind, start_demo_engine, test_config, wait_for_stats};

#[tokio::test]
async fn test_multiply_two_chains_one_add_three() {
    let running = start_demo_engine(test_config(false)).await;
    let queue = running.queue().clone();

    let parent = queue.insert(&MultiplyTwoArgs { number: 10 }).await.unwrap();
    wait_for_stats(&queue, "parent and child to complete", |s| s.completed == 2).await;

    let children = jobs_of_kind(&queue, "add_three").await;
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].args, json!({ "number": 20 }));
    assert_eq!(children[0].state, JobState::Completed);
    assert_eq!(children[0].result, Some(json!({ "input": 20, "result": 23 })));

    let parent = fetch(&queue, parent.id).await;
    assert_eq!(parent.state, JobState::Completed);
    assert_eq!(parent.attempt, 1);
    assert_eq!(parent.result, Some(json!({ "input": 10, "result": 20 })));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_multiply_seven_enqueues_fourteen_once() {
    let running = start_demo_engine(test_config(true)).await;
    let queue = running.queue().clone();

    queue.insert(&MultiplyTwoArgs { number: 7 }).await.unwrap();
    assert_eq!(running.pool().run_until_idle().await.unwrap(), 2);

    let children = jobs_of_kind(&queue, "add_three").await;
    let fourteens = children
        .iter()
        .filter(|job| job.args == json!({ "number": 14 }))
        .count();
    assert_eq!(fourteens, 1);
    assert_eq!(children.len(), 1);

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_add_one_does_not_chain() {
    let running = start_demo_engine(test_config(true)).await;
    let queue = running.queue().clone();

    let job = queue.insert(&AddOneArgs { number: 5 }).await.unwrap();
    assert_eq!(running.pool().run_until_idle().await.unwrap(), 1);

    let job = fetch(&queue, job.id).await;
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.result, Some(json!({ "input": 5, "result": 6 })));

    let all = queue.store().list(&JobFilter::default()).await.unwrap();
    assert_eq!(all.len(), 1);

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_demo_batch_through_dispatch_loop() {
    let running = start_demo_engine(test_config(false)).await;
    let queue = running.queue().clone();

    seed_demo_batch(&queue).await.unwrap();
    wait_for_stats(&queue, "demo batch and its chained jobs", |s| s.completed == 7).await;

    let mut results: Vec<i64> = jobs_of_kind(&queue, "add_three")
        .await
        .iter()
        .map(|job| job.result.as_ref().unwrap()["result"].as_i64().unwrap())
        .collect();
    results.sort_unstable();
    assert_eq!(results, vec![17, 23, 53]);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.failed, 0);

    running.shutdown().await.unwrap();
}

struct RefusingDispatcher;

#[async_trait]
impl ChainDispatcher for RefusingDispatcher {
    async fn dispatch(&self, _job: NewJob) -> Result<Job, AppError> {
        Err(AppError::queue("insert rejected"))
    }
}

#[tokio::test]
async fn test_chain_failure_fails_parent_without_child() {
    let mut config = test_config(true);
    config.worker.max_attempts = 2;

    let mut engine = Engine::new(config, Span::none());
    engine.register(AddOneWorker).unwrap();
    engine.register(AddThreeWorker).unwrap();
    engine
        .register(MultiplyTwoWorker::new(ChainLink::bound_to(Arc::new(
            RefusingDispatcher,
        ))))
        .unwrap();
    let running = engine.start().await.unwrap();
    let queue = running.queue().clone();

    let parent = queue.insert(&MultiplyTwoArgs { number: 10 }).await.unwrap();
    assert_eq!(running.pool().run_until_idle().await.unwrap(), 2);

    let parent = fetch(&queue, parent.id).await;
    assert_eq!(parent.state, JobState::Failed);
    assert_eq!(parent.attempt, 2);
    assert!(parent.result.is_none());
    assert!(parent.errors.iter().all(|e| e.cause == FailureCause::Chain));
    assert!(jobs_of_kind(&queue, "add_three").await.is_empty());

    running.shutdown().await.unwrap();
}

#[derive(Serialize, Deserialize)]
struct FlakyParentArgs {}

impl JobArgs for FlakyParentArgs {
    const KIND: &'static str = "flaky_parent";
}

/// Chains a child, then fails its first attempt.
struct FlakyParent {
    chain: ChainLink,
}

#[async_trait]
impl Worker for FlakyParent {
    type Args = FlakyParentArgs;

    fn is_ready(&self) -> bool {
        self.chain.is_bound()
    }

    async fn work(
        &self,
        ctx: &JobContext,
        _job: &Job,
        _args: FlakyParentArgs,
    ) -> Result<Option<Value>, JobExecutionError> {
        self.chain.enqueue(&AddThreeArgs { number: 1 }).await?;
        if ctx.attempt() == 1 {
            return Err(JobExecutionError::failed("lost connection after chaining"));
        }
        Ok(None)
    }
}

#[tokio::test]
async fn test_retried_parent_chains_again() {
    let mut engine = Engine::new(test_config(true), Span::none());
    let chain = engine.chain_link();
    engine.register(FlakyParent { chain }).unwrap();
    engine.register(AddThreeWorker).unwrap();
    let running = engine.start().await.unwrap();
    let queue = running.queue().clone();

    let parent = queue.insert(&FlakyParentArgs {}).await.unwrap();
    assert_eq!(running.pool().run_until_idle().await.unwrap(), 4);

    let parent = fetch(&queue, parent.id).await;
    assert_eq!(parent.state, JobState::Completed);
    assert_eq!(parent.attempt, 2);

    let children = jobs_of_kind(&queue, "add_three").await;
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|c| c.state == JobState::Completed));

    running.shutdown().await.unwrap();
}
