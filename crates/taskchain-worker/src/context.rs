//! Per-execution context handed to workers.

use tokio_util::sync::CancellationToken;

/// Context provided to a worker for one attempt.
///
/// The cancellation token fires when the attempt times out or when the pool
/// abandons in-flight work at the shutdown deadline. Cancellation is
/// cooperative: the pool keeps the slot until the worker returns or its
/// grace period runs out.
#[derive(Debug, Clone)]
pub struct JobContext {
    cancellation_token: CancellationToken,
    attempt: u32,
    max_attempts: u32,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, attempt: u32, max_attempts: u32) -> Self {
        Self {
            cancellation_token,
            attempt,
            max_attempts,
        }
    }

    /// Context with its own token, for calling workers outside a pool.
    pub fn detached(attempt: u32, max_attempts: u32) -> Self {
        Self::new(CancellationToken::new(), attempt, max_attempts)
    }

    /// The attempt being executed (1-based).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a failure now fails the job permanently.
    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Resolves once the attempt has been cancelled.
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await
    }

    pub(crate) fn cancel(&self) {
        self.cancellation_token.cancel();
    }
}
