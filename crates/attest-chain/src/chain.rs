//! Chain-integrity verification primitives.
//!
//! These functions operate over in-memory entry slices in ascending
//! sequence order, exactly as loaded from the store.  They recompute every
//! hash and check every link; signature verification lives one layer up in
//! `attest-verify`, so these walks stay dependency-free and reusable by
//! both the verifier and the migration procedure.

use attest_contracts::verification::ChainVerificationResult;
use attest_contracts::AuditEntry;

use crate::canonical::recompute_entry_hash;

/// Walk a chain segment, recomputing each hash and checking each link.
///
/// `expected_first_previous` seeds the linkage check for the first entry:
/// pass the preceding entry's hash when verifying a sub-range, or `None`
/// for a walk from the start of the chain (where sequence 1 must reference
/// the genesis sentinel).  The walk short-circuits at the first mismatch
/// and reports the last sequence number that checked out.
pub fn verify_chain_integrity(
    entries: &[AuditEntry],
    expected_first_previous: Option<&str>,
) -> ChainVerificationResult {
    let mut errors = Vec::new();
    let mut entries_checked = 0u64;
    let mut last_valid_sequence = None;

    let mut expected_previous: Option<String> = expected_first_previous.map(str::to_string);
    let mut expected_sequence: Option<u64> = None;

    for entry in entries {
        entries_checked += 1;
        let seq = entry.sequence_number;

        if let Some(expected) = expected_sequence {
            if seq != expected {
                errors.push(format!(
                    "sequence gap: expected {expected}, found {seq}"
                ));
                break;
            }
        }

        let link_ok = match &expected_previous {
            Some(previous) => {
                if &entry.previous_hash != previous {
                    errors.push(format!(
                        "entry {seq}: previous_hash does not match entry {}",
                        seq.saturating_sub(1)
                    ));
                    false
                } else {
                    true
                }
            }
            // First entry of a from-the-start walk: the genesis rule.
            None => {
                if seq == 1 && !entry.references_genesis() {
                    errors.push(format!(
                        "entry 1: previous_hash must be the genesis sentinel, found '{}'",
                        entry.previous_hash
                    ));
                    false
                } else if seq != 1 && entry.references_genesis() {
                    errors.push(format!(
                        "entry {seq}: references genesis but is not the first entry"
                    ));
                    false
                } else {
                    true
                }
            }
        };
        if !link_ok {
            break;
        }

        let recomputed = recompute_entry_hash(entry);
        if entry.entry_hash != recomputed {
            errors.push(format!(
                "entry {seq}: stored hash {} does not match recomputed {recomputed}",
                entry.entry_hash
            ));
            break;
        }

        last_valid_sequence = Some(seq);
        expected_previous = Some(entry.entry_hash.clone());
        expected_sequence = Some(seq + 1);
    }

    ChainVerificationResult {
        valid: errors.is_empty(),
        entries_checked,
        errors,
        last_valid_sequence,
    }
}

/// Fast tamper localization: the sequence number of the first entry whose
/// stored hash does not match its recomputed hash, or `None` for a clean
/// chain.
///
/// This deliberately checks only hash correctness, not linkage or
/// signatures; it is the cheap first probe an operator runs when a full
/// verification reports a problem.
pub fn find_tampering(entries: &[AuditEntry]) -> Option<u64> {
    entries
        .iter()
        .find(|entry| entry.entry_hash != recompute_entry_hash(entry))
        .map(|entry| entry.sequence_number)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
