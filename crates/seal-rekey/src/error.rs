//! Rekey error type.

use seal_core::SealError;
use seal_ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RekeyError {
    /// Missing key, bad batch size, unreadable data directory.
    #[error("rekey configuration error: {0}")]
    Config(String),

    /// A checkpoint exists for a different idempotency key. Resuming it
    /// under this key would mix two jobs.
    #[error("checkpoint {path} belongs to idempotency key {checkpoint:?}, not {supplied:?}")]
    IdempotencyMismatch {
        path: String,
        checkpoint: String,
        supplied: String,
    },

    /// The checkpoint does not describe a state this job can reach.
    #[error("checkpoint {path} is inconsistent: {reason}")]
    CheckpointCorrupt { path: String, reason: String },

    /// The record is sealed under a key this job was not given.
    #[error("record {record_id} is sealed under {found}, expected {expected}")]
    UnknownKey {
        record_id: String,
        expected: String,
        found: String,
    },

    /// Authentication failed: wrong key material, or the record was altered.
    #[error("record {record_id} failed to decrypt")]
    Decrypt { record_id: String },

    #[error("record encryption failed: {0}")]
    Encrypt(String),

    /// A line in a record file is not a valid encrypted record.
    #[error("{path}:{line}: {reason}")]
    Record {
        path: String,
        line: usize,
        reason: String,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Seal(#[from] SealError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
