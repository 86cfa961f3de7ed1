//! # attest-chain
//!
//! The hash chain itself: byte-exact canonicalization of entry content,
//! per-entry hash computation, chain-integrity verification primitives, and
//! the [`AuditLedger`] append path that producers call.
//!
//! The canonicalization in [`canonical`] is the load-bearing invariant of
//! the whole system.  Any deviation — key order, whitespace, numeric
//! formatting — breaks verification of every historical entry, so it is
//! pinned down by exact-bytes tests rather than round-trip tests.

pub mod canonical;
pub mod chain;
pub mod ledger;

pub use canonical::{canonical_entry_content, compute_entry_hash};
pub use chain::{find_tampering, verify_chain_integrity};
pub use ledger::AuditLedger;
