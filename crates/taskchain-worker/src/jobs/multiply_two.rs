//! `multiply_two`: doubles a number and chains `add_three` with the product.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use taskchain_entity::{Job, JobArgs};

use crate::chain::ChainLink;
use crate::context::JobContext;
use crate::executor::{JobExecutionError, Worker};

use super::add_three::AddThreeArgs;
use super::{arithmetic_result, overflow};

/// Arguments for `multiply_two`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplyTwoArgs {
    pub number: i64,
}

impl JobArgs for MultiplyTwoArgs {
    const KIND: &'static str = "multiply_two";
}

/// Handles `multiply_two` jobs.
///
/// The job only completes once its `add_three` follow-up is enqueued; if the
/// enqueue fails, the attempt fails and is retried like any other error.
#[derive(Debug)]
pub struct MultiplyTwoWorker {
    chain: ChainLink,
}

impl MultiplyTwoWorker {
    pub fn new(chain: ChainLink) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Worker for MultiplyTwoWorker {
    type Args = MultiplyTwoArgs;

    fn is_ready(&self) -> bool {
        self.chain.is_bound()
    }

    async fn work(
        &self,
        _ctx: &JobContext,
        job: &Job,
        args: MultiplyTwoArgs,
    ) -> Result<Option<Value>, JobExecutionError> {
        let result = args
            .number
            .checked_mul(2)
            .ok_or_else(|| overflow(MultiplyTwoArgs::KIND, args.number))?;

        tracing::info!(job_id = %job.id, input = args.number, result, "MultiplyTwo processed");

        let child = self
            .chain
            .enqueue(&AddThreeArgs { number: result })
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, result, "Failed to insert AddThree job");
            })?;

        tracing::info!(
            next_job_id = %child.id,
            next_kind = AddThreeArgs::KIND,
            input = result,
            "Chained job inserted"
        );
        Ok(Some(arithmetic_result(args.number, result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use taskchain_core::error::AppError;
    use taskchain_entity::NewJob;

    use crate::chain::ChainDispatcher;
    use crate::jobs::tests::job_for;

    /// Records every dispatched job, or refuses all of them.
    #[derive(Default)]
    struct RecordingDispatcher {
        refuse: bool,
        sent: Mutex<Vec<NewJob>>,
    }

    #[async_trait]
    impl ChainDispatcher for RecordingDispatcher {
        async fn dispatch(&self, new_job: NewJob) -> Result<Job, AppError> {
            if self.refuse {
                return Err(AppError::queue("queue unavailable"));
            }
            let job = job_for(&AddThreeArgs { number: 0 });
            let job = Job {
                kind: new_job.kind.clone(),
                args: new_job.args.clone(),
                ..job
            };
            self.sent.lock().unwrap().push(new_job);
            Ok(job)
        }
    }

    #[tokio::test]
    async fn test_chains_add_three_with_product() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let worker = MultiplyTwoWorker::new(ChainLink::bound_to(dispatcher.clone()));
        let args = MultiplyTwoArgs { number: 7 };

        let out = worker
            .work(&JobContext::detached(1, 3), &job_for(&args), args)
            .await
            .unwrap();
        assert_eq!(out, Some(json!({ "input": 7, "result": 14 })));

        let sent = dispatcher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "add_three");
        assert_eq!(sent[0].args, json!({ "number": 14 }));
    }

    #[tokio::test]
    async fn test_dispatch_failure_fails_the_attempt() {
        let dispatcher = Arc::new(RecordingDispatcher {
            refuse: true,
            ..Default::default()
        });
        let worker = MultiplyTwoWorker::new(ChainLink::bound_to(dispatcher.clone()));
        let args = MultiplyTwoArgs { number: 10 };

        let err = worker
            .work(&JobContext::detached(1, 3), &job_for(&args), args)
            .await
            .unwrap_err();
        assert!(matches!(err, JobExecutionError::Chain(_)));
        assert!(err.is_retryable());
        assert!(dispatcher.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_not_ready_until_bound() {
        let link = ChainLink::unbound();
        let worker = MultiplyTwoWorker::new(link.clone());
        assert!(!worker.is_ready());

        link.bind(Arc::new(RecordingDispatcher::default())).unwrap();
        assert!(worker.is_ready());
    }
}
