//! The audit verifier.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use attest_chain::canonical::recompute_entry_hash;
use attest_chain::{find_tampering, verify_chain_integrity};
use attest_contracts::verification::{
    ChainSummary, CompleteVerificationResult, EntryVerificationResult, RangeVerificationResult,
    RootAnchorVerificationResult, SignatureVerificationResult, VerificationReport,
};
use attest_contracts::{AttestError, AttestResult, AuditEntry};
use attest_signing::SignatureManager;
use attest_store::AuditStore;

/// Full verification runs slower than this are flagged in the report.
const SLOW_VERIFICATION_MS: u64 = 10_000;
/// Chains larger than this get an incremental-verification recommendation.
const LARGE_CHAIN_ENTRIES: u64 = 100_000;

/// Read-only auditor over the persisted chain and key registry.
///
/// Side-effect-free apart from timing measurement: every method re-reads
/// the store and reports what it finds.
pub struct AuditVerifier {
    store: Arc<AuditStore>,
    manager: Arc<SignatureManager>,
}

impl AuditVerifier {
    pub fn new(store: Arc<AuditStore>, manager: Arc<SignatureManager>) -> Self {
        Self { store, manager }
    }

    // ── Whole-chain verification ──────────────────────────────────────────────

    /// Recompute hash-chain validity and signature validity independently
    /// over the whole chain and combine them.
    ///
    /// An empty chain is trivially valid.  Only environmental failures
    /// (unreadable store) return `Err`; a tampered chain is a normal result.
    pub fn verify_complete_chain(&self) -> AttestResult<CompleteVerificationResult> {
        let started = Instant::now();
        let entries = self.store.all_entries()?;

        if entries.is_empty() {
            return Ok(CompleteVerificationResult {
                valid: true,
                entries_verified: 0,
                hash_chain_valid: true,
                signatures_valid: true,
                hash_chain_errors: Vec::new(),
                signature_errors: Vec::new(),
                verification_time_ms: started.elapsed().as_millis() as u64,
                summary: "Empty audit log".to_string(),
                error: None,
            });
        }

        let chain = verify_chain_integrity(&entries, None);
        let signatures = self.verify_signatures(&entries);
        let valid = chain.valid && signatures.valid;

        let summary = if valid {
            format!("All {} entries verified successfully", entries.len())
        } else {
            format!(
                "Verification failed: {} hash-chain error(s), {} signature error(s)",
                chain.errors.len(),
                signatures.errors.len()
            )
        };

        let result = CompleteVerificationResult {
            valid,
            entries_verified: entries.len() as u64,
            hash_chain_valid: chain.valid,
            signatures_valid: signatures.valid,
            hash_chain_errors: chain.errors,
            signature_errors: signatures.errors,
            verification_time_ms: started.elapsed().as_millis() as u64,
            summary,
            error: None,
        };

        if result.valid {
            info!(
                entries = result.entries_verified,
                elapsed_ms = result.verification_time_ms,
                "complete chain verification passed"
            );
        } else {
            warn!(
                entries = result.entries_verified,
                hash_chain_valid = result.hash_chain_valid,
                signatures_valid = result.signatures_valid,
                "complete chain verification FAILED"
            );
        }
        Ok(result)
    }

    /// Verify every entry's signature, dispatching by stored key id.
    ///
    /// All failures are collected; the walk never stops early.  Key ids
    /// referenced by entries but absent from the registry are reported as
    /// untrusted.
    pub fn verify_signatures(&self, entries: &[AuditEntry]) -> SignatureVerificationResult {
        let mut errors = Vec::new();
        let mut untrusted_keys = Vec::new();
        let mut known: HashMap<String, bool> = HashMap::new();
        let mut entries_signed = 0u64;
        let mut entries_verified = 0u64;

        for entry in entries {
            let seq = entry.sequence_number;
            if entry.signature.is_empty() {
                errors.push(format!("entry {seq} has no signature"));
                continue;
            }
            entries_signed += 1;

            let registered = *known.entry(entry.key_id.clone()).or_insert_with(|| {
                matches!(self.store.key_by_id(&entry.key_id), Ok(Some(_)))
            });
            if !registered && !untrusted_keys.contains(&entry.key_id) {
                untrusted_keys.push(entry.key_id.clone());
            }

            if self
                .manager
                .verify_signature(&entry.entry_hash, &entry.signature, Some(&entry.key_id))
            {
                entries_verified += 1;
            } else {
                errors.push(format!(
                    "entry {seq}: invalid signature (key {})",
                    entry.key_id
                ));
            }
        }

        SignatureVerificationResult {
            valid: errors.is_empty(),
            entries_signed,
            entries_verified,
            errors,
            untrusted_keys,
        }
    }

    // ── Single-entry and ranged verification ──────────────────────────────────

    /// Verify one entry: hash correctness, previous-hash linkage (including
    /// the genesis rule), and signature validity.  All failures are
    /// aggregated rather than short-circuited.
    ///
    /// A nonexistent sequence number is an explicit `NotFound` error, never
    /// silently valid.
    pub fn verify_entry(&self, sequence: u64) -> AttestResult<EntryVerificationResult> {
        let entry = self
            .store
            .entry_by_sequence(sequence)?
            .ok_or(AttestError::NotFound {
                kind: "audit entry",
                id: sequence.to_string(),
            })?;

        let mut errors = Vec::new();

        let recomputed = recompute_entry_hash(&entry);
        let hash_valid = entry.entry_hash == recomputed;
        if !hash_valid {
            errors.push(format!(
                "stored hash {} does not match recomputed {recomputed}",
                entry.entry_hash
            ));
        }

        // Genesis rule: only sequence 1 may reference the sentinel, and
        // sequence 1 may reference nothing else.
        let previous_hash_valid = if sequence == 1 {
            if entry.references_genesis() {
                true
            } else {
                errors.push(format!(
                    "genesis violation: first entry's previous_hash must be the genesis sentinel, found '{}'",
                    entry.previous_hash
                ));
                false
            }
        } else if entry.references_genesis() {
            errors.push(format!(
                "genesis violation: entry {sequence} references genesis but is not the first entry"
            ));
            false
        } else {
            match self.store.entry_by_sequence(sequence - 1)? {
                Some(previous) if previous.entry_hash == entry.previous_hash => true,
                Some(previous) => {
                    errors.push(format!(
                        "previous_hash does not match entry {} (expected {})",
                        previous.sequence_number, previous.entry_hash
                    ));
                    false
                }
                None => {
                    errors.push(format!("previous entry {} is missing", sequence - 1));
                    false
                }
            }
        };

        let signature_valid =
            self.manager
                .verify_signature(&entry.entry_hash, &entry.signature, Some(&entry.key_id));
        if !signature_valid {
            errors.push(format!("invalid signature (key {})", entry.key_id));
        }

        Ok(EntryVerificationResult {
            valid: errors.is_empty(),
            sequence_number: sequence,
            hash_valid,
            previous_hash_valid,
            signature_valid,
            errors,
        })
    }

    /// Verify a bounded sub-range of the chain, for incremental or
    /// background auditing.  The first entry of the range is linked against
    /// its stored predecessor when one exists.
    pub fn verify_range(&self, start: u64, end: u64) -> AttestResult<RangeVerificationResult> {
        let entries = self.store.entries_in_range(start, end)?;

        // Seed the linkage check with the hash of the entry just before the
        // range, when the range does not start at the chain's origin.
        let seed = if start > 1 {
            self.store
                .entry_by_sequence(start - 1)?
                .map(|previous| previous.entry_hash)
        } else {
            None
        };

        let chain = verify_chain_integrity(&entries, seed.as_deref());
        let signatures = self.verify_signatures(&entries);

        let mut errors = chain.errors;
        errors.extend(signatures.errors);

        Ok(RangeVerificationResult {
            valid: chain.valid && signatures.valid,
            start_sequence: start,
            end_sequence: end,
            entries_verified: entries.len() as u64,
            hash_chain_valid: chain.valid,
            signatures_valid: signatures.valid,
            errors,
        })
    }

    // ── Tamper localization and anchors ───────────────────────────────────────

    /// The sequence number of the first entry whose stored hash does not
    /// match its recomputed hash, or `None` for a clean chain.
    pub fn find_tampering_fast(&self) -> AttestResult<Option<u64>> {
        let entries = self.store.all_entries()?;
        let found = find_tampering(&entries);
        if let Some(sequence) = found {
            warn!(sequence, "tampering localized");
        }
        Ok(found)
    }

    /// Validate every stored root anchor against the current chain and
    /// signature state.  Zero anchors is valid-and-empty, not an error.
    pub fn verify_root_anchors(&self) -> AttestResult<RootAnchorVerificationResult> {
        let anchors = self.store.root_anchors()?;
        if anchors.is_empty() {
            return Ok(RootAnchorVerificationResult {
                valid: true,
                verified_count: 0,
                total_count: 0,
                errors: Vec::new(),
                message: Some("No root anchors recorded".to_string()),
            });
        }

        let mut errors = Vec::new();
        let mut verified_count = 0u64;

        for anchor in &anchors {
            let label = format!("anchor [{}..{}]", anchor.sequence_start, anchor.sequence_end);

            match self.store.entry_by_sequence(anchor.sequence_end)? {
                Some(entry) if entry.entry_hash == anchor.root_hash => {
                    let range = self.verify_range(anchor.sequence_start, anchor.sequence_end)?;
                    if range.valid {
                        verified_count += 1;
                    } else {
                        errors.push(format!("{label}: covered range fails verification"));
                    }
                }
                Some(entry) => {
                    errors.push(format!(
                        "{label}: root hash {} does not match entry hash {}",
                        anchor.root_hash, entry.entry_hash
                    ));
                }
                None => {
                    errors.push(format!(
                        "{label}: entry {} no longer exists",
                        anchor.sequence_end
                    ));
                }
            }
        }

        Ok(RootAnchorVerificationResult {
            valid: errors.is_empty(),
            verified_count,
            total_count: anchors.len() as u64,
            errors,
            message: None,
        })
    }

    // ── Summary and report ────────────────────────────────────────────────────

    /// Describe the persisted chain without judging validity.  Store
    /// failures are captured in the `error` field so the report can still
    /// be produced.
    pub fn chain_summary(&self) -> ChainSummary {
        let gather = || -> AttestResult<ChainSummary> {
            Ok(ChainSummary {
                total_entries: self.store.entry_count()?,
                signed_entries: self.store.signed_entry_count()?,
                sequence_range: self.store.sequence_range()?.unwrap_or((0, 0)),
                current_hash: self.store.last_entry()?.map(|entry| entry.entry_hash),
                error: None,
            })
        };
        gather().unwrap_or_else(|e| ChainSummary {
            total_entries: 0,
            signed_entries: 0,
            sequence_range: (0, 0),
            current_hash: None,
            error: Some(e.to_string()),
        })
    }

    /// Produce the full audit report: a complete-chain run, the chain
    /// summary, signing-key metadata, and derived recommendations.
    pub fn get_verification_report(&self) -> AttestResult<VerificationReport> {
        debug!("producing verification report");
        let verification_result = self.verify_complete_chain()?;
        let chain_summary = self.chain_summary();
        let signing_key_info = self.manager.key_info()?;

        let first_tampered_sequence = if verification_result.hash_chain_valid {
            None
        } else {
            self.find_tampering_fast()?
        };
        let tampering_detected = !verification_result.valid;

        let mut recommendations = Vec::new();
        if !verification_result.hash_chain_valid {
            match first_tampered_sequence {
                Some(sequence) => recommendations.push(format!(
                    "CRITICAL: tampering detected at sequence {sequence}. Isolate the audit store and investigate immediately."
                )),
                None => recommendations.push(
                    "CRITICAL: hash chain is broken. Isolate the audit store and investigate immediately."
                        .to_string(),
                ),
            }
        }
        if !verification_result.signatures_valid {
            recommendations.push(
                "CRITICAL: one or more entry signatures failed verification. Audit the key registry."
                    .to_string(),
            );
        }
        if verification_result.verification_time_ms > SLOW_VERIFICATION_MS {
            recommendations.push(format!(
                "Verification took {}ms. Consider incremental verification against root anchors.",
                verification_result.verification_time_ms
            ));
        }
        if chain_summary.total_entries > LARGE_CHAIN_ENTRIES {
            recommendations.push(format!(
                "Large audit log ({} entries). Schedule ranged verification instead of full scans.",
                chain_summary.total_entries
            ));
        }
        if let Some(info) = &signing_key_info {
            if info.revoked || !info.active {
                recommendations.push(format!(
                    "Active signing key {} is revoked or inactive. Review the key lifecycle.",
                    info.key_id
                ));
            }
        }

        Ok(VerificationReport {
            timestamp: Utc::now().to_rfc3339(),
            verification_result,
            chain_summary,
            signing_key_info,
            tampering_detected,
            first_tampered_sequence,
            recommendations,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
