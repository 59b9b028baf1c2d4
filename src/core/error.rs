//! Error types for admission and scheduling operations.

use thiserror::Error;

/// Failures originating inside the synthesis engine, as seen across the
/// adapter boundary. The queue never interprets these beyond delivering
/// them to the submitting caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SynthesisError {
    /// The engine itself failed (model error, backend crash, OOM).
    #[error("synthesis model error: {0}")]
    Model(String),
    /// The engine did not produce audio within its own deadline.
    #[error("synthesis timed out")]
    Timeout,
    /// The requested voice identifier is unknown to the engine.
    #[error("unknown voice: {0}")]
    InvalidVoice(String),
}

/// Errors produced by the admission gate, ledger, and job queue.
#[derive(Debug, Error)]
pub enum GateError {
    /// Insufficient balance or frozen account; surfaced before any job is
    /// submitted and never retried automatically.
    #[error("admission denied: {left} syntheses left (frozen: {frozen})")]
    AdmissionDenied {
        /// Remaining allowance at the time of denial.
        left: u32,
        /// Whether the account is administratively frozen.
        frozen: bool,
    },
    /// Flood window not elapsed; the caller may retry after the wait.
    #[error("rate limited: retry in {wait_secs}s")]
    RateLimited {
        /// Whole seconds remaining until the next request is admissible.
        wait_secs: u64,
    },
    /// Input text exceeds the configured maximum length.
    #[error("text too long: {len} characters (max {max})")]
    TextTooLong {
        /// Length of the rejected text, in characters.
        len: usize,
        /// Configured maximum, in characters.
        max: usize,
    },
    /// The synthesis adapter failed; delivered through the job's result
    /// handle. Allowance is never consumed for a failed job.
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    /// The ledger store is unreachable or rejected the operation. Always a
    /// hard failure; the ledger never assumes optimistic success.
    #[error("ledger store error: {0}")]
    Persistence(String),
    /// The queue was shut down before this job could run.
    #[error("queue closed")]
    QueueClosed,
    /// The job's result sender was dropped without a resolution (the job
    /// task panicked). Surfaced instead of hanging the caller forever.
    #[error("job abandoned before resolution")]
    JobAbandoned,
}

impl From<sqlx::Error> for GateError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
