//! `add_one`: increments a number.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use taskchain_entity::{Job, JobArgs};

use crate::context::JobContext;
use crate::executor::{JobExecutionError, Worker};

use super::{arithmetic_result, overflow};

/// Arguments for `add_one`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOneArgs {
    pub number: i64,
}

impl JobArgs for AddOneArgs {
    const KIND: &'static str = "add_one";
}

/// Handles `add_one` jobs
#[derive(Debug, Default)]
pub struct AddOneWorker;

#[async_trait]
impl Worker for AddOneWorker {
    type Args = AddOneArgs;

    async fn work(
        &self,
        _ctx: &JobContext,
        job: &Job,
        args: AddOneArgs,
    ) -> Result<Option<Value>, JobExecutionError> {
        let result = args
            .number
            .checked_add(1)
            .ok_or_else(|| overflow(AddOneArgs::KIND, args.number))?;

        tracing::info!(job_id = %job.id, input = args.number, result, "AddOne processed");
        Ok(Some(arithmetic_result(args.number, result)))
    }
}
