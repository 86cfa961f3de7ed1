//! Byte-exact canonicalization and entry hashing.
//!
//! Canonical hash input layout (must match exactly across implementations):
//! a JSON object with the keys `event_data`, `event_type`, `previous_hash`,
//! `sequence_number`, `timestamp` in alphabetical order, compact separators,
//! UTF-8 encoded, hashed with SHA-256 and rendered as lowercase hex.
//!
//! The object is built over a `BTreeMap` so key ordering is guaranteed by
//! the map type itself, not by a serializer feature flag.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

use attest_contracts::AuditEntry;

/// The canonical JSON text an entry hash commits to.
///
/// `timestamp` is included verbatim — the ledger never reformats it, so
/// hashing is independent of any datetime library's rendering choices.
/// `event_data` is the producer's opaque serialized payload, included as a
/// JSON string (its inner structure is not canonicalized; it was fixed the
/// moment the producer serialized it).
pub fn canonical_entry_content(
    sequence_number: u64,
    timestamp: &str,
    event_type: &str,
    event_data: &str,
    previous_hash: &str,
) -> String {
    let mut fields: BTreeMap<&str, Value> = BTreeMap::new();
    fields.insert("event_data", Value::from(event_data));
    fields.insert("event_type", Value::from(event_type));
    fields.insert("previous_hash", Value::from(previous_hash));
    fields.insert("sequence_number", Value::from(sequence_number));
    fields.insert("timestamp", Value::from(timestamp));

    // serde_json's compact writer emits no insignificant whitespace, and a
    // BTreeMap serializes in key order.
    serde_json::to_string(&fields).expect("canonical map of JSON scalars always serializes")
}

/// SHA-256 of the canonical content, as lowercase hex.
pub fn compute_entry_hash(
    sequence_number: u64,
    timestamp: &str,
    event_type: &str,
    event_data: &str,
    previous_hash: &str,
) -> String {
    let content =
        canonical_entry_content(sequence_number, timestamp, event_type, event_data, previous_hash);
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Recompute the hash a stored entry *should* carry, from its own fields.
pub fn recompute_entry_hash(entry: &AuditEntry) -> String {
    compute_entry_hash(
        entry.sequence_number,
        &entry.timestamp,
        &entry.event_type,
        &entry.event_data,
        &entry.previous_hash,
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_content_is_exact_bytes() {
        // Pinned byte-for-byte: alphabetical keys, compact separators.
        let content = canonical_entry_content(
            1,
            "2025-01-06T12:00:00+00:00",
            "handler_action",
            "{\"action\":\"speak\"}",
            AuditEntry::GENESIS,
        );
        assert_eq!(
            content,
            "{\"event_data\":\"{\\\"action\\\":\\\"speak\\\"}\",\
             \"event_type\":\"handler_action\",\
             \"previous_hash\":\"genesis\",\
             \"sequence_number\":1,\
             \"timestamp\":\"2025-01-06T12:00:00+00:00\"}"
        );
    }

    #[test]
    fn hash_is_deterministic() {
        let a = compute_entry_hash(7, "2025-01-06T12:00:00+00:00", "tool_call", "payload", "abc");
        let b = compute_entry_hash(7, "2025-01-06T12:00:00+00:00", "tool_call", "payload", "abc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn every_field_contributes_to_the_hash() {
        let base = compute_entry_hash(1, "t", "e", "d", "p");
        assert_ne!(base, compute_entry_hash(2, "t", "e", "d", "p"));
        assert_ne!(base, compute_entry_hash(1, "t2", "e", "d", "p"));
        assert_ne!(base, compute_entry_hash(1, "t", "e2", "d", "p"));
        assert_ne!(base, compute_entry_hash(1, "t", "e", "d2", "p"));
        assert_ne!(base, compute_entry_hash(1, "t", "e", "d", "p2"));
    }

    #[test]
    fn unicode_event_data_hashes_over_utf8_bytes() {
        let a = compute_entry_hash(1, "t", "e", "naïve ünïcode ◎", "p");
        let b = compute_entry_hash(1, "t", "e", "naïve ünïcode ◎", "p");
        assert_eq!(a, b);
    }

    #[test]
    fn recompute_matches_direct_computation() {
        let entry = AuditEntry {
            sequence_number: 3,
            entry_hash: String::new(),
            previous_hash: "prevhash".to_string(),
            signature: String::new(),
            key_id: String::new(),
            timestamp: "2025-01-06T12:00:00+00:00".to_string(),
            event_type: "handler_action".to_string(),
            event_data: "data".to_string(),
        };
        assert_eq!(
            recompute_entry_hash(&entry),
            compute_entry_hash(3, "2025-01-06T12:00:00+00:00", "handler_action", "data", "prevhash")
        );
    }
}
