//! # seal-crypto: Signing and Commitment Primitives
//!
//! - **HMAC-SHA256** and **Ed25519** signing over `CanonicalBytes`, the mode
//!   chosen per call by the configured [`ArtifactSigner`].
//! - **Merkle roots** over sorted leaf digests for per-category commitments.
//! - **Signature envelopes** (`<artifact>.sig.json`), single or multisig,
//!   with threshold verification that reports every signature.
//!
//! ## Crate Policy
//!
//! - Depends only on `seal-core` internally.
//! - Tests use real SHA-256, real HMAC and real Ed25519; nothing is mocked.

pub mod ed25519;
pub mod envelope;
pub mod error;
pub mod hmac;
pub mod merkle;
pub mod signer;

pub use ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use envelope::{
    append_signature, read_envelope, sig_path_for, sign_artifact, verify_artifact_file,
    verify_multisig, KeyRing, MultisigEntry, MultisigEnvelope, MultisigOutcome, PayloadType,
    SignatureBlock, SignatureEnvelope, SignerIdentity, VerifyKey,
};
pub use error::{CryptoError, SignatureError};
pub use hmac::HmacKey;
pub use merkle::{merkle_root, MERKLE_ALGORITHM};
pub use signer::{
    select_signer, ArtifactSigner, Ed25519Signer, ExternalSigner, HmacSigner, SignatureAlgorithm,
    SignerConfig,
};
