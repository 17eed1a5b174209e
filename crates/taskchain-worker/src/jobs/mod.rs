//! Demo arithmetic workers.
//!
//! `add_one` and `add_three` compute and return; `multiply_two` also chains
//! an `add_three` job with its product.

pub mod add_one;
pub mod add_three;
pub mod multiply_two;

pub use add_one::{AddOneArgs, AddOneWorker};
pub use add_three::{AddThreeArgs, AddThreeWorker};
pub use multiply_two::{MultiplyTwoArgs, MultiplyTwoWorker};

use serde_json::{Value, json};

use taskchain_core::result::AppResult;
use taskchain_entity::Job;
use taskchain_store::JobQueue;

use crate::executor::JobExecutionError;
use crate::lifecycle::Engine;

/// Register every demo worker, wiring `multiply_two` to the engine's chain link.
pub fn register_demo_workers(engine: &mut Engine) -> AppResult<()> {
    let chain = engine.chain_link();
    engine.register(AddOneWorker)?;
    engine.register(MultiplyTwoWorker::new(chain))?;
    engine.register(AddThreeWorker)?;
    Ok(())
}

/// Enqueue the demo batch; returns the inserted jobs in order.
pub async fn seed_demo_batch(queue: &JobQueue) -> AppResult<Vec<Job>> {
    let jobs = vec![
        queue.insert(&AddOneArgs { number: 5 }).await?,
        queue.insert(&MultiplyTwoArgs { number: 10 }).await?,
        queue.insert(&AddOneArgs { number: 100 }).await?,
        queue.insert(&MultiplyTwoArgs { number: 7 }).await?,
        queue.insert(&AddThreeArgs { number: 50 }).await?,
    ];

    for job in &jobs {
        tracing::info!(job_id = %job.id, kind = %job.kind, args = %job.args, "Seeded demo job");
    }
    Ok(jobs)
}

fn arithmetic_result(input: i64, result: i64) -> Value {
    json!({ "input": input, "result": result })
}

fn overflow(kind: &str, input: i64) -> JobExecutionError {
    JobExecutionError::Permanent(format!("{kind}({input}) overflows a 64-bit integer"))
}
