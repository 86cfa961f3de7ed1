//! Runtime error types for the ATTEST audit ledger.
//!
//! All fallible operations return `AttestResult<T>`.  Two classes of
//! failure are deliberately *not* errors: a signature that does not verify
//! and a chain that turns out to be tampered — those are normal, fully
//! described results so callers can treat verification as a pure predicate.

use thiserror::Error;

/// The unified error type for the ATTEST crates.
#[derive(Debug, Error)]
pub enum AttestError {
    /// A signing operation was attempted before key material exists.
    #[error("signer not initialized")]
    UninitializedSigner,

    /// A queried entry or key does not exist.  Distinct from "invalid" —
    /// the verifier surfaces this explicitly rather than treating a
    /// missing entry as silently valid.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Key material on disk or in the registry is malformed.
    #[error("invalid key material: {reason}")]
    InvalidKey { reason: String },

    /// A storage or filesystem operation failed.  Carries the operation
    /// and path so the failure can be diagnosed.
    #[error("storage failure during {op} ({path}): {reason}")]
    Storage {
        op: &'static str,
        path: String,
        reason: String,
    },

    /// The ledger rejected an append (e.g. the internal lock is poisoned).
    #[error("audit append failed: {reason}")]
    AppendFailed { reason: String },

    /// Key migration failed.  The message always reports whether the
    /// rollback-from-backup itself succeeded.
    #[error("key migration failed at {step}: {reason}")]
    MigrationFailed { step: String, reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

/// Convenience alias used throughout the ATTEST crates.
pub type AttestResult<T> = Result<T, AttestError>;
