use std::time::Duration;

/// How a send attempt failed, as far as retrying is concerned.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The channel told us exactly how long to back off.
    #[error("retry after {0:?}")]
    RetryAfter(Duration),

    /// Rate limited without an explicit wait.
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient error: {0}")]
    Transient(String),

    /// Retrying won't help (bad chat id, bot blocked, message rejected).
    #[error("permanent error: {0}")]
    Permanent(String),
}

/// Outcome of a batch send; failures are counted, never raised.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub sent: usize,
    pub failed: usize,
}
