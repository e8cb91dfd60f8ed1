//! # seal-abp: Authority Boundary Primitives
//!
//! An ABP declares what an authorized run may do: objectives, tools, data
//! permissions, approvals, escalation paths, runtime validators and the
//! proof artifacts it must produce. It is bound to one authority ledger
//! entry by id and entry hash, and committed to by its own content hash.
//!
//! - [`AbpBuilder`] builds one document and refuses contradictions.
//! - [`compose`] merges children into a parent that records their hashes.
//! - [`verify_abp`] reports every check separately.

pub mod build;
pub mod compose;
pub mod error;
pub mod model;
pub mod schema;
pub mod verify;

pub use build::{
    check_contradictions, compute_abp_hash, compute_abp_id, load_abp, resolve_authority_ref,
    write_abp, AbpBuilder, AbpSections,
};
pub use compose::{compose, merge_delegation_review, ComposeRequest};
pub use error::AbpError;
pub use model::*;
pub use schema::{schema_violations, ABP_SCHEMA};
pub use verify::{verify_abp, verify_abp_file};
