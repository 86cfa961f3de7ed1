//! # attest-verify
//!
//! The read-only auditor for the ATTEST ledger.  [`AuditVerifier`] checks
//! whole-chain or ranged integrity, verifies individual entries, locates
//! tampering, validates root anchors, and produces the operator-facing
//! verification report.
//!
//! Nothing here mutates anything.  A tampered chain is a fully-described
//! result, never an error; only environmental failures (an unreadable
//! store) propagate as `Err`.

pub mod verifier;

pub use verifier::AuditVerifier;
