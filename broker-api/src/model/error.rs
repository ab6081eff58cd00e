use thiserror::Error;

/// Error taxonomy for gateway interactions.
///
/// Only `Transport` and `ClockSkew` are retryable; everything else
/// surfaces to the order/notification layer.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Network timeout or connection failure. Retried with pacing.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The exchange rejected our request timestamp. A time resync is
    /// performed before the next retry attempt.
    #[error("request timestamp rejected by exchange (clock skew)")]
    ClockSkew,

    /// The exchange refused the request outright.
    #[error("exchange rejection {code}: {message}")]
    Rejected { code: i64, message: String },

    /// An event from the stream that does not match the expected
    /// shape. Never silently dropped.
    #[error("malformed stream event: {reason} (payload: {payload})")]
    MalformedEvent { reason: String, payload: String },
}

impl GatewayError {
    pub fn retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::ClockSkew)
    }
}
