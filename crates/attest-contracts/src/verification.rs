//! Verification result schemas.
//!
//! Every verification operation returns one of these fully-typed results.
//! A tampered chain is a *described* outcome, never an error: `valid` goes
//! false and the `errors` lists say exactly what failed and where.

use serde::{Deserialize, Serialize};

/// Summary of the persisted chain, independent of validity checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSummary {
    /// Total number of persisted entries.
    pub total_entries: u64,

    /// Entries carrying a non-empty signature.
    pub signed_entries: u64,

    /// First and last sequence numbers, `[0, 0]` for an empty chain.
    pub sequence_range: (u64, u64),

    /// `entry_hash` of the last entry, or `None` for an empty chain.
    pub current_hash: Option<String>,

    /// Set when the summary itself could not be produced (e.g. the
    /// database is unreadable).
    pub error: Option<String>,
}

/// Result of walking the hash chain and recomputing every link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerificationResult {
    pub valid: bool,

    /// Entries examined before returning (the walk short-circuits at the
    /// first mismatch).
    pub entries_checked: u64,

    /// Human-readable descriptions of every failure found.
    pub errors: Vec<String>,

    /// The last sequence number whose hash and linkage both checked out,
    /// when the walk failed partway.
    pub last_valid_sequence: Option<u64>,
}

/// Result of verifying signatures over a set of entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureVerificationResult {
    pub valid: bool,
    pub entries_signed: u64,
    pub entries_verified: u64,
    pub errors: Vec<String>,

    /// Key ids referenced by entries but absent from the registry.
    pub untrusted_keys: Vec<String>,
}

/// Combined result of a full-chain verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteVerificationResult {
    /// `hash_chain_valid && signatures_valid`.
    pub valid: bool,
    pub entries_verified: u64,
    pub hash_chain_valid: bool,
    pub signatures_valid: bool,
    pub hash_chain_errors: Vec<String>,
    pub signature_errors: Vec<String>,
    pub verification_time_ms: u64,
    pub summary: String,

    /// Environmental failure (unreadable store), when verification could
    /// not run at all.
    pub error: Option<String>,
}

/// Result of verifying a single entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryVerificationResult {
    pub valid: bool,
    pub sequence_number: u64,
    pub hash_valid: bool,
    pub previous_hash_valid: bool,
    pub signature_valid: bool,

    /// All independent failures, aggregated — the check does not stop at
    /// the first problem.
    pub errors: Vec<String>,
}

/// Result of verifying a bounded sub-range of the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeVerificationResult {
    pub valid: bool,
    pub start_sequence: u64,
    pub end_sequence: u64,
    pub entries_verified: u64,
    pub hash_chain_valid: bool,
    pub signatures_valid: bool,
    pub errors: Vec<String>,
}

/// Result of validating the stored root anchors against the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootAnchorVerificationResult {
    pub valid: bool,
    pub verified_count: u64,
    pub total_count: u64,
    pub errors: Vec<String>,
    pub message: Option<String>,
}

/// Metadata about the active signing key, as reported to auditors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyInfo {
    pub key_id: String,
    pub algorithm: String,
    pub key_size: u32,
    pub created_at: String,
    pub active: bool,
    pub revoked: bool,
}

/// The full audit report: a complete-chain run plus context and derived
/// recommendations for the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// ISO-8601 time the report was produced.
    pub timestamp: String,
    pub verification_result: CompleteVerificationResult,
    pub chain_summary: ChainSummary,
    pub signing_key_info: Option<KeyInfo>,
    pub tampering_detected: bool,
    pub first_tampered_sequence: Option<u64>,

    /// Actionable findings, ordered by severity.  Empty for a clean,
    /// fast, reasonably-sized chain with an active key.
    pub recommendations: Vec<String>,
}
