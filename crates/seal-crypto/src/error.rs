//! Error types for key handling and signing.

use seal_core::SealError;
use thiserror::Error;

/// Error in key parsing or primitive operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key material could not be decoded or has the wrong length.
    #[error("key error: {0}")]
    KeyError(String),

    /// A signature or digest string could not be decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    /// Digest input was malformed.
    #[error("digest error: {0}")]
    DigestError(String),
}

/// Error producing or checking a signature envelope.
///
/// `BackendUnavailable`, `SignerTimeout` and `SignerFailed` describe a signer
/// that could not produce a signature at all. They are never reported as an
/// invalid signature.
#[derive(Error, Debug)]
pub enum SignatureError {
    /// No `.sig.json` sibling exists for the artifact.
    #[error("signature envelope not found: {0}")]
    MissingEnvelope(String),

    /// A signature did not verify.
    #[error("invalid signature: {0}")]
    Invalid(String),

    /// Fewer valid signatures than required.
    #[error("threshold not met: {valid}/{required} valid signatures")]
    ThresholdNotMet {
        /// Independently valid signatures.
        valid: usize,
        /// Required count.
        required: usize,
    },

    /// The requested signing backend is not configured.
    #[error("signing backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The external signer did not finish in time.
    #[error("external signer timed out after {secs}s")]
    SignerTimeout {
        /// Enforced timeout.
        secs: u64,
    },

    /// The external signer exited unsuccessfully or returned garbage.
    #[error("external signer failed: {0}")]
    SignerFailed(String),

    /// The envelope file is neither a single nor a multisig block.
    #[error("unrecognized signature format: {0}")]
    UnknownFormat(String),

    /// Key or encoding failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Envelope could not be (de)serialized or the artifact could not be read.
    #[error(transparent)]
    Seal(#[from] SealError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SignatureError> for SealError {
    fn from(e: SignatureError) -> Self {
        match e {
            SignatureError::MissingEnvelope(path) => {
                SealError::NotFound(format!("signature envelope {path}"))
            }
            SignatureError::Seal(inner) => inner,
            SignatureError::Io(io) => SealError::Io(io),
            other => SealError::Signature(other.to_string()),
        }
    }
}

impl From<CryptoError> for SealError {
    fn from(e: CryptoError) -> Self {
        SealError::Signature(e.to_string())
    }
}

impl From<serde_json::Error> for SignatureError {
    fn from(e: serde_json::Error) -> Self {
        SignatureError::Seal(SealError::from(e))
    }
}

impl From<seal_core::CanonicalizationError> for SignatureError {
    fn from(e: seal_core::CanonicalizationError) -> Self {
        SignatureError::Seal(SealError::from(e))
    }
}
