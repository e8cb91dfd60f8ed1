//! # seal-rekey: Key Rotation for Encrypted Record Stores
//!
//! Re-encrypts NDJSON record files from a retiring key to its successor.
//! The job is long-running and resumable: it commits a [`Checkpoint`] after
//! every batch and can be re-run after a crash at any point without
//! re-encrypting a committed record twice. A resume must present the same
//! idempotency key as the run it continues.
//!
//! [`rotate`] is the gated entry point. It validates a `REENCRYPT`
//! [`ActionContract`](seal_ledger::ActionContract) and records the action
//! in the authority action ledger before any record is touched.

pub mod checkpoint;
pub mod cipher;
pub mod error;
pub mod job;
pub mod rotate;

pub use checkpoint::{Checkpoint, Cursor, JobStatus, JOB_VERSION};
pub use cipher::{fingerprint_id, EncryptedRecord, RecordKey, KEY_LEN};
pub use error::RekeyError;
pub use job::{RekeyJob, RekeySummary, Rotation, DEFAULT_BATCH_SIZE, DEFAULT_CHECKPOINT};
pub use rotate::{rotate, RotationAuthority, RotationOutcome, REENCRYPT_ACTION, REENCRYPT_COMPLETED};
