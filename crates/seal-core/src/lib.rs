//! # seal-core: Foundational Types for Sealed-Run Proofs
//!
//! Every other crate in the workspace depends on `seal-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **`CanonicalBytes` newtype.** All digest and signature input flows
//!    through `CanonicalBytes::new()` (RFC 8785 via `serde_jcs`, floats
//!    rejected). No raw `serde_json::to_vec()` feeds a hash.
//!
//! 2. **`sha256_digest()` accepts only `&CanonicalBytes`.** File bytes are
//!    the one exception and go through `sha256_file` / `sha256_raw`.
//!
//! 3. **Explicit logical clock.** `Timestamp` is UTC-only at seconds
//!    precision; hashed structures take their time from the caller.
//!
//! 4. **Two error channels.** `SealError` for fail-fast construction,
//!    `VerificationReport` for accumulating verification findings.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `seal-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod fsio;
pub mod identity;
pub mod report;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use digest::{
    content_digest, sha256_digest, sha256_file, sha256_raw, ContentDigest, DigestAlgorithm,
};
pub use error::{AuthorityReason, CanonicalizationError, ErrorKind, SealError};
pub use identity::{det_id, det_id_of, IdKind};
pub use report::{Check, Severity, VerificationReport};
pub use temporal::Timestamp;
