//! Errors raised while normalizing and persisting transfers.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum TransferError {
    /// A storage read or write failed. Never retried here.
    #[error("store unavailable during {operation}")]
    StoreUnavailable {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// The payload does not have the expected field count or shape.
    #[error("malformed {pallet}.{method} event: {reason}")]
    MalformedEvent {
        pallet: String,
        method: String,
        reason: String,
    },

    /// The multi-asset identifier carries no `token` tag.
    #[error("unsupported asset: {0}")]
    UnsupportedAsset(String),

    #[error("invalid token schedule: {0}")]
    InvalidTokenSchedule(String),
}

impl TransferError {
    pub fn store(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::StoreUnavailable {
            operation,
            source: source.into(),
        }
    }

    pub fn malformed(pallet: &str, method: &str, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            pallet: pallet.to_string(),
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

pub type TransferResult<T> = Result<T, TransferError>;
