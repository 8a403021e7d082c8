//! Error taxonomy for the generative-service invocation layer.
//!
//! Only communication failures are retried; a response that arrives but does
//! not parse to the requested shape is deterministic and retrying it would
//! re-bill the same broken call. Callers are expected to match on the two
//! variants and apply their own stage-specific fallback for
//! `MalformedResponse`.

use thiserror::Error;

/// Failure modes of a single generative-service invocation.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network, timeout, or non-success HTTP status. Retryable.
    #[error("generative service unreachable: {0}")]
    Communication(String),

    /// The response text did not yield the expected structured shape.
    /// Not retryable.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Communication(_))
    }
}
