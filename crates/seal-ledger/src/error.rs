//! Ledger error type.

use seal_core::{AuthorityReason, SealError};
use thiserror::Error;

/// Error appending to or reading a ledger file.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The entry to append is malformed.
    #[error("invalid ledger entry: {0}")]
    InvalidEntry(String),

    /// A referenced entry does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The operation is not permitted by the authority state.
    #[error("authority error ({reason}): {detail}")]
    Authority {
        /// Reason code.
        reason: AuthorityReason,
        /// Context.
        detail: String,
    },

    /// A line on disk could not be parsed.
    #[error("corrupt ledger line {line} in {path}: {reason}")]
    Corrupt {
        /// Ledger path.
        path: String,
        /// 1-based line number.
        line: usize,
        /// Parse error.
        reason: String,
    },

    /// The writer lock could not be acquired in time.
    #[error("ledger {0} is locked by another writer")]
    LockTimeout(String),

    /// Canonicalization or JSON failure.
    #[error(transparent)]
    Seal(#[from] SealError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn authority(reason: AuthorityReason, detail: impl Into<String>) -> Self {
        Self::Authority {
            reason,
            detail: detail.into(),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Seal(SealError::from(e))
    }
}

impl From<seal_core::CanonicalizationError> for LedgerError {
    fn from(e: seal_core::CanonicalizationError) -> Self {
        Self::Seal(SealError::from(e))
    }
}

impl From<LedgerError> for SealError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidEntry(msg) => SealError::Construction(msg),
            LedgerError::NotFound(what) => SealError::NotFound(what),
            LedgerError::Authority { reason, detail } => SealError::Authority { reason, detail },
            corrupt @ LedgerError::Corrupt { .. } => SealError::Integrity(corrupt.to_string()),
            locked @ LedgerError::LockTimeout(_) => SealError::Construction(locked.to_string()),
            LedgerError::Seal(inner) => inner,
            LedgerError::Io(io) => SealError::Io(io),
        }
    }
}
