//! Audit entry and event types.
//!
//! `AuditEntry` is a single row in the hash-chained audit log.  Entries are
//! created once, appended in increasing `sequence_number` order, and never
//! mutated — except by key migration, which rewrites the chain-derived
//! fields (`entry_hash`, `previous_hash`, `signature`, `key_id`) while
//! preserving the event content.

use serde::{Deserialize, Serialize};

/// A single entry in the SHA-256 hash chain.
///
/// The entry hash commits to the event content and the previous entry's
/// hash; the signature commits to the entry hash.  Modifying any field of a
/// persisted entry — even a single byte of `event_data` — invalidates
/// `entry_hash` and every subsequent `previous_hash`, which the verifier
/// detects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonically increasing, gapless position in the chain, starting at 1.
    pub sequence_number: u64,

    /// SHA-256 hash (lowercase hex) of this entry's canonical content.
    pub entry_hash: String,

    /// `entry_hash` of the previous entry, or [`AuditEntry::GENESIS`] for
    /// sequence 1.
    pub previous_hash: String,

    /// Base64 signature over `entry_hash`, produced by the key named in
    /// `key_id`.
    pub signature: String,

    /// Identifier of the signing key (`agent-{hex12}` format).
    pub key_id: String,

    /// ISO-8601 timestamp supplied by the producer.  Stored and hashed as
    /// text, verbatim — hash reproducibility must never depend on datetime
    /// round-tripping.
    pub timestamp: String,

    /// Event classification tag (e.g. `"handler_action"`).
    pub event_type: String,

    /// Opaque serialized event payload.  The ledger does not interpret it.
    pub event_data: String,
}

impl AuditEntry {
    /// The sentinel `previous_hash` for the first entry in every chain.
    ///
    /// A value that can never be a real SHA-256 hex digest, making genesis
    /// detection unambiguous.  Only sequence 1 may legitimately carry it.
    pub const GENESIS: &'static str = "genesis";

    /// True when this entry claims to be the start of the chain.
    pub fn references_genesis(&self) -> bool {
        self.previous_hash == Self::GENESIS
    }
}

/// The event fields a producer supplies when appending.
///
/// Producers never construct hashes or signatures themselves — they hand
/// over the event and receive back the assigned chain position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event classification tag.
    pub event_type: String,

    /// Opaque serialized payload.
    pub event_data: String,

    /// ISO-8601 timestamp, recorded verbatim.
    pub timestamp: String,
}

/// What the ledger returns to a producer after a successful append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendReceipt {
    /// The sequence number assigned to the entry.
    pub sequence_number: u64,

    /// The computed entry hash.
    pub entry_hash: String,

    /// The base64 signature over the entry hash.
    pub signature: String,
}
