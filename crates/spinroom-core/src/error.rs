use thiserror::Error;

/// Rejection taxonomy for inbound events. None of these are fatal to
/// the process; each one affects only the sending client and is
/// surfaced through its acknowledgment (or silently dropped, for
/// `Unauthorized`).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("rate limit exceeded, retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    /// Socket not registered as the stated room/client pair. Dropped
    /// without an ack so probing cannot confirm a room exists.
    #[error("not a member of this room")]
    Unauthorized,
}

impl CoreError {
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            CoreError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}
