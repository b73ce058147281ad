//! Unified error type for the tracker.
//!
//! Error kinds mirror the propagation policy: master-data and upstream
//! failures degrade a tick, transient database errors abort it, fatal ones
//! require operator intervention, and key/value failures never block writes.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the tracker.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is missing, unparseable, or inconsistent.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Master-data file missing or unparseable.
    #[error("master data unavailable: {0}")]
    MasterDataUnavailable(String),

    /// Upstream network failure, timeout, or non-200 status.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Upstream body could not be decoded.
    #[error("upstream response malformed: {0}")]
    UpstreamMalformed(String),

    /// Transient database error (connection, deadlock); the next tick retries.
    #[error("transient database error: {0}")]
    DbTransient(String),

    /// Non-recoverable database error (schema mismatch).
    #[error("fatal database error: {0}")]
    DbFatal(String),

    /// Key/value backing unreachable; callers degrade to empty state.
    #[error("key/value backing unavailable: {0}")]
    KvUnavailable(String),

    /// Attempted write that would break a storage invariant (duplicate PK).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A tick operation exceeded its deadline.
    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config_invalid(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }

    pub fn master_data(msg: impl Into<String>) -> Self {
        Self::MasterDataUnavailable(msg.into())
    }

    pub fn upstream_unreachable(msg: impl Into<String>) -> Self {
        Self::UpstreamUnreachable(msg.into())
    }

    pub fn upstream_malformed(msg: impl Into<String>) -> Self {
        Self::UpstreamMalformed(msg.into())
    }

    pub fn db_transient(msg: impl Into<String>) -> Self {
        Self::DbTransient(msg.into())
    }

    pub fn db_fatal(msg: impl Into<String>) -> Self {
        Self::DbFatal(msg.into())
    }

    pub fn kv_unavailable(msg: impl Into<String>) -> Self {
        Self::KvUnavailable(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Whether a later tick may succeed without operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::MasterDataUnavailable(_)
                | Self::UpstreamUnreachable(_)
                | Self::UpstreamMalformed(_)
                | Self::DbTransient(_)
                | Self::KvUnavailable(_)
                | Self::Timeout(_)
        )
    }
}
