//! Error type for sealing and the seal-and-prove pipeline.

use seal_abp::AbpError;
use seal_core::SealError;
use seal_crypto::SignatureError;
use seal_ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    /// The configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// A required input directory or file is absent. Nothing is written.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// A directory in the hash scope could not be fully listed.
    #[error("cannot scan {path}: {reason}")]
    Scan { path: String, reason: String },

    #[error("decision {decision_id:?} not found in {log}")]
    DecisionNotFound { decision_id: String, log: String },

    /// The decision log is not valid CSV for the expected columns.
    #[error("decision log {path}: {reason}")]
    DecisionLog { path: String, reason: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Abp(#[from] AbpError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Seal(#[from] SealError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RunError {
    fn from(e: serde_json::Error) -> Self {
        Self::Seal(SealError::from(e))
    }
}

impl From<seal_core::CanonicalizationError> for RunError {
    fn from(e: seal_core::CanonicalizationError) -> Self {
        Self::Seal(SealError::from(e))
    }
}

impl From<RunError> for SealError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Config(msg) => SealError::Construction(msg),
            missing @ RunError::MissingInput(_) => SealError::NotFound(missing.to_string()),
            missing @ RunError::DecisionNotFound { .. } => SealError::NotFound(missing.to_string()),
            scan @ RunError::Scan { .. } => SealError::Construction(scan.to_string()),
            bad @ RunError::DecisionLog { .. } => SealError::Construction(bad.to_string()),
            RunError::Ledger(inner) => inner.into(),
            RunError::Abp(inner) => inner.into(),
            RunError::Signature(inner) => inner.into(),
            RunError::Seal(inner) => inner,
            RunError::Io(inner) => SealError::Io(inner),
        }
    }
}
