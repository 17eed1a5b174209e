//! `add_three`: adds three to a number. The tail of the demo chain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use taskchain_entity::{Job, JobArgs};

use crate::context::JobContext;
use crate::executor::{JobExecutionError, Worker};

use super::{arithmetic_result, overflow};

/// Arguments for `add_three`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddThreeArgs {
    pub number: i64,
}

impl JobArgs for AddThreeArgs {
    const KIND: &'static str = "add_three";
}

#[derive(Debug, Default)]
pub struct AddThreeWorker;

#[async_trait]
impl Worker for AddThreeWorker {
    type Args = AddThreeArgs;

    async fn work(
        &self,
        _ctx: &JobContext,
        job: &Job,
        args: AddThreeArgs,
    ) -> Result<Option<Value>, JobExecutionError> {
        let result = args
            .number
            .checked_add(3)
            .ok_or_else(|| overflow(AddThreeArgs::KIND, args.number))?;

        tracing::info!(job_id = %job.id, input = args.number, result, "AddThree processed");
        Ok(Some(arithmetic_result(args.number, result)))
    }
}
