//! Job domain entities.

pub mod args;
pub mod id;
pub mod model;
pub mod status;

pub use args::JobArgs;
pub use id::JobId;
pub use model::{AttemptError, Job, NewJob};
pub use status::{FailureCause, JobState};
