//! Root anchor checkpoints.

use serde::{Deserialize, Serialize};

/// A periodic checkpoint covering a contiguous range of entries.
///
/// `root_hash` is the `entry_hash` of the range's last entry — a compact
/// commitment to everything up to `sequence_end`.  Anchors let auditors
/// bound verification cost and detect large-scale tampering without
/// re-walking the whole chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootAnchor {
    /// First sequence number covered (inclusive).
    pub sequence_start: u64,

    /// Last sequence number covered (inclusive).
    pub sequence_end: u64,

    /// `entry_hash` of the entry at `sequence_end`.
    pub root_hash: String,

    /// ISO-8601 time the anchor was written.
    pub timestamp: String,
}
