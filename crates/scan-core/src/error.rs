use thiserror::Error;

/// The six error kinds of §7, each with a distinct recovery policy enforced
/// by the scheduler and Store callers rather than by this type itself.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("transient fetch failure on {exchange} for {symbol}: {detail}")]
    TransientFetch {
        exchange: String,
        symbol: String,
        detail: String,
    },

    #[error("permanent fetch failure on {exchange} for {symbol}: {detail}")]
    PermanentFetch {
        exchange: String,
        symbol: String,
        detail: String,
    },

    #[error("store I/O error: {0}")]
    StoreIO(String),

    #[error("store corruption detected: {0}")]
    StoreCorruption(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Whether the scheduler should retry with backoff within the symbol budget (§7).
    pub fn retryable(&self) -> bool {
        matches!(self, ScanError::TransientFetch { .. } | ScanError::StoreIO(_))
    }

    /// Whether this error should demote the enclosing cycle's quality badge
    /// for the affected symbol, rather than abort the cycle.
    pub fn degrades_quality(&self) -> bool {
        !matches!(self, ScanError::Config(_) | ScanError::StoreCorruption(_))
    }

    /// Whether the scheduler must halt entirely and await manual intervention (§7).
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::StoreCorruption(_) | ScanError::Config(_))
    }
}
