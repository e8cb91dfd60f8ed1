use seal_core::SealError;
use seal_ledger::LedgerError;
use thiserror::Error;

/// Failure building or loading an ABP.
#[derive(Error, Debug)]
pub enum AbpError {
    /// The same identifier is both allowed and denied. Nothing is produced.
    #[error("contradictory ABP: objectives {objectives:?}, tools {tools:?} appear in both allow and deny")]
    Contradiction {
        objectives: Vec<String>,
        tools: Vec<String>,
    },

    /// A required section or field is missing or malformed.
    #[error("invalid ABP: {0}")]
    Invalid(String),

    /// The referenced authority entry is not in the ledger.
    #[error("authority entry {entry_id:?} not found in {ledger}")]
    AuthorityNotFound { entry_id: String, ledger: String },

    /// The embedded schema failed to compile.
    #[error("ABP schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Seal(#[from] SealError),
}

impl From<serde_json::Error> for AbpError {
    fn from(e: serde_json::Error) -> Self {
        Self::Seal(SealError::from(e))
    }
}

impl From<seal_core::CanonicalizationError> for AbpError {
    fn from(e: seal_core::CanonicalizationError) -> Self {
        Self::Seal(SealError::from(e))
    }
}

impl From<AbpError> for SealError {
    fn from(e: AbpError) -> Self {
        match e {
            contradiction @ AbpError::Contradiction { .. } => {
                SealError::Construction(contradiction.to_string())
            }
            AbpError::Invalid(msg) => SealError::Construction(msg),
            missing @ AbpError::AuthorityNotFound { .. } => SealError::NotFound(missing.to_string()),
            AbpError::Schema(msg) => SealError::Construction(msg),
            AbpError::Ledger(inner) => inner.into(),
            AbpError::Seal(inner) => inner,
        }
    }
}
