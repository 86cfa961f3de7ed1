//! The append path producers call.
//!
//! A producer hands over `(event_type, event_data, timestamp)` and receives
//! back the assigned sequence number, entry hash, and signature; it never
//! constructs hashes or signatures itself.  The ledger keeps the chain head
//! in memory, seeded from the store at construction, so each append is one
//! hash, one signature, and one insert.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use attest_contracts::{
    AppendReceipt, AttestError, AttestResult, AuditEntry, AuditEvent, RootAnchor,
};
use attest_signing::SignatureManager;
use attest_store::AuditStore;

use crate::canonical::compute_entry_hash;

/// Default number of entries between root-anchor checkpoints.
pub const DEFAULT_ANCHOR_INTERVAL: u64 = 100;

struct ChainHead {
    next_sequence: u64,
    previous_hash: String,
}

/// The append-only audit ledger.
///
/// Appends are serialized by the internal head lock; verification reads the
/// store independently and never blocks an append for long.
pub struct AuditLedger {
    store: Arc<AuditStore>,
    manager: Arc<SignatureManager>,
    /// Entries between root anchors; `0` disables anchoring.
    anchor_interval: u64,
    head: Mutex<ChainHead>,
}

impl AuditLedger {
    /// Build a ledger over an initialized signature manager, seeding the
    /// chain head from the last persisted entry.
    pub fn new(
        store: Arc<AuditStore>,
        manager: Arc<SignatureManager>,
        anchor_interval: u64,
    ) -> AttestResult<Self> {
        let head = match store.last_entry()? {
            Some(last) => ChainHead {
                next_sequence: last.sequence_number + 1,
                previous_hash: last.entry_hash,
            },
            None => ChainHead {
                next_sequence: 1,
                previous_hash: AuditEntry::GENESIS.to_string(),
            },
        };
        debug!(next_sequence = head.next_sequence, "audit ledger ready");
        Ok(Self {
            store,
            manager,
            anchor_interval,
            head: Mutex::new(head),
        })
    }

    /// Append one event: assign the next sequence number, compute the chain
    /// hash, sign it, and persist the entry.
    pub fn append(&self, event: &AuditEvent) -> AttestResult<AppendReceipt> {
        let mut head = self.head.lock().map_err(|e| AttestError::AppendFailed {
            reason: format!("chain head lock poisoned: {e}"),
        })?;

        let sequence_number = head.next_sequence;
        let entry_hash = compute_entry_hash(
            sequence_number,
            &event.timestamp,
            &event.event_type,
            &event.event_data,
            &head.previous_hash,
        );
        let signature = self.manager.sign_entry(&entry_hash)?;

        let entry = AuditEntry {
            sequence_number,
            entry_hash: entry_hash.clone(),
            previous_hash: head.previous_hash.clone(),
            signature: signature.clone(),
            key_id: self.manager.active_key_id()?,
            timestamp: event.timestamp.clone(),
            event_type: event.event_type.clone(),
            event_data: event.event_data.clone(),
        };
        self.store.append_entry(&entry)?;

        head.next_sequence = sequence_number + 1;
        head.previous_hash = entry_hash.clone();

        // The entry is committed at this point; an anchor is a checkpoint,
        // not chain state, so a failed anchor write must not cost the
        // producer its receipt.
        if self.anchor_interval > 0 && sequence_number % self.anchor_interval == 0 {
            if let Err(e) = self.write_anchor(sequence_number, &entry_hash) {
                warn!(sequence_number, error = %e, "could not write root anchor");
            }
        }

        debug!(sequence_number, event_type = %event.event_type, "audit entry appended");
        Ok(AppendReceipt {
            sequence_number,
            entry_hash,
            signature,
        })
    }

    /// Checkpoint the range ending at `sequence_end`.  The anchor's root
    /// hash is the last covered entry's hash, which commits to the whole
    /// prefix through the chain.
    fn write_anchor(&self, sequence_end: u64, root_hash: &str) -> AttestResult<()> {
        let anchor = RootAnchor {
            sequence_start: sequence_end + 1 - self.anchor_interval,
            sequence_end,
            root_hash: root_hash.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };
        self.store.add_root_anchor(&anchor)?;
        info!(
            sequence_start = anchor.sequence_start,
            sequence_end, "root anchor written"
        );
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::verify_chain_integrity;
    use attest_signing::UnifiedSigningKey;

    fn ledger_in(dir: &tempfile::TempDir, anchor_interval: u64) -> (Arc<AuditStore>, AuditLedger) {
        let store = Arc::new(AuditStore::open(dir.path().join("audit.db")).unwrap());
        let key = Arc::new(UnifiedSigningKey::with_key_path(Some(
            dir.path().join("agent_signing.key"),
        )));
        let manager = Arc::new(SignatureManager::new(key, Arc::clone(&store)));
        manager.initialize().unwrap();
        let ledger = AuditLedger::new(Arc::clone(&store), manager, anchor_interval).unwrap();
        (store, ledger)
    }

    fn event(step: u64) -> AuditEvent {
        AuditEvent {
            event_type: "handler_action".to_string(),
            event_data: format!("{{\"step\":{step}}}"),
            timestamp: format!("2025-01-06T12:00:{step:02}+00:00"),
        }
    }

    #[test]
    fn appends_build_a_valid_chain() {
        let dir = tempfile::tempdir().unwrap();
        let (store, ledger) = ledger_in(&dir, 0);

        for step in 1..=5 {
            let receipt = ledger.append(&event(step)).unwrap();
            assert_eq!(receipt.sequence_number, step);
        }

        let entries = store.all_entries().unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].previous_hash, AuditEntry::GENESIS);
        assert!(verify_chain_integrity(&entries, None).valid);
    }

    #[test]
    fn receipt_matches_the_persisted_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (store, ledger) = ledger_in(&dir, 0);

        let receipt = ledger.append(&event(1)).unwrap();
        let entry = store.entry_by_sequence(1).unwrap().unwrap();
        assert_eq!(entry.entry_hash, receipt.entry_hash);
        assert_eq!(entry.signature, receipt.signature);
        assert!(!entry.key_id.is_empty());
    }

    #[test]
    fn head_reseeds_from_the_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (_store, ledger) = ledger_in(&dir, 0);
            ledger.append(&event(1)).unwrap();
            ledger.append(&event(2)).unwrap();
        }

        // A fresh ledger over the same store continues the chain.
        let (store, ledger) = ledger_in(&dir, 0);
        let receipt = ledger.append(&event(3)).unwrap();
        assert_eq!(receipt.sequence_number, 3);

        let entries = store.all_entries().unwrap();
        assert!(verify_chain_integrity(&entries, None).valid);
    }

    #[test]
    fn failed_anchor_write_does_not_lose_the_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let (store, ledger) = ledger_in(&dir, 2);

        // Occupy the [1..2] anchor slot so the ledger's own insert hits the
        // unique-range constraint.
        store
            .add_root_anchor(&RootAnchor {
                sequence_start: 1,
                sequence_end: 2,
                root_hash: "pre-existing".to_string(),
                timestamp: "2025-01-06T00:00:00+00:00".to_string(),
            })
            .unwrap();

        ledger.append(&event(1)).unwrap();
        // Entry 2 triggers the failing anchor write; the append itself is
        // already committed and must still return its receipt.
        let receipt = ledger.append(&event(2)).unwrap();
        assert_eq!(receipt.sequence_number, 2);
        assert!(store.entry_by_sequence(2).unwrap().is_some());

        // The chain continues past the failed checkpoint.
        let receipt = ledger.append(&event(3)).unwrap();
        assert_eq!(receipt.sequence_number, 3);
        assert!(verify_chain_integrity(&store.all_entries().unwrap(), None).valid);
    }

    #[test]
    fn anchors_are_written_every_interval() {
        let dir = tempfile::tempdir().unwrap();
        let (store, ledger) = ledger_in(&dir, 3);

        for step in 1..=7 {
            ledger.append(&event(step)).unwrap();
        }

        let anchors = store.root_anchors().unwrap();
        assert_eq!(anchors.len(), 2);
        assert_eq!((anchors[0].sequence_start, anchors[0].sequence_end), (1, 3));
        assert_eq!((anchors[1].sequence_start, anchors[1].sequence_end), (4, 6));
        assert_eq!(
            anchors[1].root_hash,
            store.entry_by_sequence(6).unwrap().unwrap().entry_hash
        );
    }
}
