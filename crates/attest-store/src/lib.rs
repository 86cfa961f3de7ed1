//! # attest-store
//!
//! SQLite persistence for the ATTEST audit ledger: the append-only entry
//! log, the signing-key registry, and root-anchor checkpoints, plus the
//! file-level backup/restore that key migration relies on.
//!
//! The store is deliberately dumb: it knows nothing about hashing or
//! signatures.  Chain construction lives in `attest-chain`, verification in
//! `attest-verify`.

pub mod backup;
pub mod store;

pub use backup::{create_backup, restore_backup, BackupSet};
pub use store::AuditStore;
