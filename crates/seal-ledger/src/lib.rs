//! # seal-ledger: Hash-Chained Append-Only Ledgers
//!
//! Three ledgers share one record shape and one chain rule:
//!
//! - [`AuthorityLedger`]: grants and revocations of decision authority.
//! - [`ActionLedger`]: privileged operations, each backed by a signed
//!   [`ActionContract`] and a signer tier.
//! - [`TransparencyLog`]: sealed runs registered by `commit_hash`.
//!
//! Files are NDJSON (or a single JSON array) and stay valid after every
//! append. Writers are serialized by [`NdjsonStore`]; readers need no lock.

pub mod action;
pub mod authority;
pub mod chain;
pub mod contract;
pub mod error;
pub mod store;
pub mod transparency;

pub use action::{check_precedence, ActionEntry, ActionLedger, ActionRecord, ActionRequest, AuthorityTier};
pub use authority::{
    active_grants, AuthorityEntry, AuthorityGrant, AuthorityLedger, AuthorityStatus, GrantRequest,
    GrantType, ScopeBound,
};
pub use chain::{compute_entry_hash, verify_chain, Chained};
pub use contract::{ActionContract, ContractRequest, DEFAULT_CONTRACT_TTL_SECS, MAX_CONTRACT_TTL_SECS};
pub use error::LedgerError;
pub use store::NdjsonStore;
pub use transparency::{verify_entry, LogAppend, LogEntry, LogHead, LogRecord, TransparencyLog};
