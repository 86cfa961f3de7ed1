//! # attest-contracts
//!
//! Shared types, schemas, and error contracts for the ATTEST audit ledger.
//!
//! All crates in the workspace import from here.  No business logic lives
//! in this crate — only data definitions and the unified error type.

pub mod anchor;
pub mod entry;
pub mod error;
pub mod keys;
pub mod verification;

pub use anchor::RootAnchor;
pub use entry::{AppendReceipt, AuditEntry, AuditEvent};
pub use error::{AttestError, AttestResult};
pub use keys::{RegistrationPayload, SigningAlgorithm, SigningKeyRecord};
