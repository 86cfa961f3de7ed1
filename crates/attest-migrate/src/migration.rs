//! The migration state machine.
//!
//! Step order: CheckCurrentKey → Backup → ObtainNewKey → LoadAllEntries →
//! Resign → AtomicDbUpdate → Verify → ArchiveOldKey → Done.  Any failure
//! after Backup rolls the database file and key directory back to their
//! backed-up state; the result message always reports whether that rollback
//! itself succeeded.
//!
//! Re-signing happens entirely in memory: nothing is persisted until the
//! single transaction in AtomicDbUpdate, so steps before it can be
//! abandoned freely.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use attest_chain::compute_entry_hash;
use attest_contracts::{AttestError, AttestResult, AuditEntry, SigningAlgorithm};
use attest_signing::rsa_legacy::{PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};
use attest_signing::{SignatureManager, UnifiedSigningKey};
use attest_store::{backup, AuditStore};
use attest_verify::AuditVerifier;

/// File name of the unified Ed25519 key inside the key directory.
const ED25519_KEY_FILE: &str = "agent_signing.key";

/// Where the migrator finds the database, key material, and backup space.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// The audit database file.
    pub db_path: PathBuf,
    /// Directory holding the signing key files (old and new).
    pub key_dir: PathBuf,
    /// Directory under which the timestamped backup is created.
    pub backup_root: PathBuf,
}

/// The step a migration failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationStep {
    CheckCurrentKey,
    Backup,
    ObtainNewKey,
    LoadAllEntries,
    Resign,
    AtomicDbUpdate,
    Verify,
    ArchiveOldKey,
    Done,
    Rollback,
}

impl std::fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CheckCurrentKey => "check_current_key",
            Self::Backup => "backup",
            Self::ObtainNewKey => "obtain_new_key",
            Self::LoadAllEntries => "load_all_entries",
            Self::Resign => "resign",
            Self::AtomicDbUpdate => "atomic_db_update",
            Self::Verify => "verify",
            Self::ArchiveOldKey => "archive_old_key",
            Self::Done => "done",
            Self::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// Outcome of a migration run.  `success == false` always means the store
/// was left (or restored to) its pre-migration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    pub success: bool,
    pub old_key_id: Option<String>,
    pub new_key_id: Option<String>,
    pub entries_migrated: u64,
    pub message: String,
}

/// Runs the one-shot migration to Ed25519.
///
/// Construct one per migration attempt.  The caller guarantees exclusive
/// access: no ledger appends and no verification runs concurrently.
pub struct KeyMigrator {
    config: MigrationConfig,
    #[cfg(test)]
    fail_during_resign: bool,
}

impl KeyMigrator {
    pub fn new(config: MigrationConfig) -> Self {
        Self {
            config,
            #[cfg(test)]
            fail_during_resign: false,
        }
    }

    /// Migrate the whole chain to Ed25519 signatures.
    ///
    /// Already-Ed25519 chains are a successful no-op.  Failures after the
    /// backup exists roll back and report `success == false` rather than
    /// erroring; only pre-backup environmental failures return `Err`.
    pub fn migrate_to_ed25519(&self) -> AttestResult<MigrationResult> {
        info!(db = %self.config.db_path.display(), "key migration starting");

        // CheckCurrentKey runs against a scoped store so the connection is
        // closed before any file-level backup or restore.
        let current = self.check_current_key()?;
        if let Some(no_op) = self.no_op_result(&current) {
            return Ok(no_op);
        }

        let backup_set = backup::create_backup(
            &self.config.db_path,
            &self.config.key_dir,
            &self.config.backup_root,
        )?;

        match self.run_guarded_steps(current.as_ref()) {
            Ok((new_key_id, entries_migrated)) => {
                info!(
                    new_key_id = %new_key_id,
                    entries_migrated,
                    "key migration complete"
                );
                Ok(MigrationResult {
                    success: true,
                    old_key_id: current.map(|c| c.key_id),
                    new_key_id: Some(new_key_id),
                    entries_migrated,
                    message: format!(
                        "Migrated to ed25519; backup retained at {}",
                        backup_set.dir.display()
                    ),
                })
            }
            Err(e) => {
                error!(error = %e, "key migration failed, rolling back");
                let rollback_note = match backup::restore_backup(
                    &backup_set,
                    &self.config.db_path,
                    &self.config.key_dir,
                ) {
                    Ok(()) => "rollback succeeded, store restored to pre-migration state"
                        .to_string(),
                    Err(restore_err) => {
                        error!(error = %restore_err, "rollback itself failed");
                        format!("ROLLBACK FAILED: {restore_err}; backup preserved at {}",
                            backup_set.dir.display())
                    }
                };
                Ok(MigrationResult {
                    success: false,
                    old_key_id: current.map(|c| c.key_id),
                    new_key_id: None,
                    entries_migrated: 0,
                    message: format!("Migration failed: {e} ({rollback_note})"),
                })
            }
        }
    }

    // ── Steps ─────────────────────────────────────────────────────────────────

    /// Identify the key the existing chain is signed with, from the last
    /// entry's key id and its registry row.  An empty chain has no current
    /// key.
    fn check_current_key(&self) -> AttestResult<Option<CurrentKey>> {
        let store = AuditStore::open(&self.config.db_path)?;
        let last = match store.last_entry()? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let algorithm = store
            .key_by_id(&last.key_id)?
            .and_then(|record| SigningAlgorithm::parse(&record.algorithm));
        Ok(Some(CurrentKey {
            key_id: last.key_id,
            algorithm,
        }))
    }

    fn no_op_result(&self, current: &Option<CurrentKey>) -> Option<MigrationResult> {
        let current = current.as_ref()?;
        if current.algorithm != Some(SigningAlgorithm::Ed25519) {
            return None;
        }
        info!(key_id = %current.key_id, "chain is already signed with ed25519, nothing to do");
        Some(MigrationResult {
            success: true,
            old_key_id: Some(current.key_id.clone()),
            new_key_id: Some(current.key_id.clone()),
            entries_migrated: 0,
            message: "Chain is already signed with ed25519".to_string(),
        })
    }

    /// ObtainNewKey through ArchiveOldKey.  Every resource opened here is
    /// dropped on return, so a rollback never races an open connection.
    fn run_guarded_steps(&self, current: Option<&CurrentKey>) -> AttestResult<(String, u64)> {
        let store = Arc::new(AuditStore::open(&self.config.db_path)?);

        // ObtainNewKey: load or generate the unified Ed25519 key and
        // register it.
        let key = Arc::new(UnifiedSigningKey::with_key_path(Some(
            self.config.key_dir.join(ED25519_KEY_FILE),
        )));
        let manager = Arc::new(SignatureManager::new(key, Arc::clone(&store)));
        manager.initialize()?;
        let new_key_id = manager.active_key_id()?;

        // LoadAllEntries + Resign, entirely in memory.
        let entries = store.all_entries()?;
        let resigned = self.resign_entries(&entries, &manager, &new_key_id)?;
        let entries_migrated = resigned.len() as u64;

        // AtomicDbUpdate: one transaction, all or nothing.
        store.replace_all_entries(&resigned)?;

        // Verify the rewritten chain end to end with the new key.
        let verification = AuditVerifier::new(Arc::clone(&store), Arc::clone(&manager))
            .verify_complete_chain()?;
        if !verification.valid {
            return Err(AttestError::MigrationFailed {
                step: MigrationStep::Verify.to_string(),
                reason: format!(
                    "post-migration verification failed: {}",
                    verification.summary
                ),
            });
        }

        self.archive_old_key(&store, current, &new_key_id)?;
        Ok((new_key_id, entries_migrated))
    }

    /// Recompute every hash against a fresh genesis-seeded chain and sign
    /// each new hash with the new key.  Sequence numbers, timestamps, and
    /// event content are preserved exactly.
    fn resign_entries(
        &self,
        entries: &[AuditEntry],
        manager: &SignatureManager,
        new_key_id: &str,
    ) -> AttestResult<Vec<AuditEntry>> {
        let mut resigned = Vec::with_capacity(entries.len());
        let mut previous_hash = AuditEntry::GENESIS.to_string();

        for (index, entry) in entries.iter().enumerate() {
            #[cfg(test)]
            {
                if self.fail_during_resign && index == entries.len() / 2 {
                    return Err(AttestError::MigrationFailed {
                        step: MigrationStep::Resign.to_string(),
                        reason: "injected mid-resign failure".to_string(),
                    });
                }
            }
            let _ = index;

            let entry_hash = compute_entry_hash(
                entry.sequence_number,
                &entry.timestamp,
                &entry.event_type,
                &entry.event_data,
                &previous_hash,
            );
            let signature = manager.sign_entry(&entry_hash)?;
            resigned.push(AuditEntry {
                sequence_number: entry.sequence_number,
                entry_hash: entry_hash.clone(),
                previous_hash: previous_hash.clone(),
                signature,
                key_id: new_key_id.to_string(),
                timestamp: entry.timestamp.clone(),
                event_type: entry.event_type.clone(),
                event_data: entry.event_data.clone(),
            });
            previous_hash = entry_hash;
        }
        Ok(resigned)
    }

    /// Mark the old key superseded and rename its files out of the way.
    /// The registry row keeps its public material — mixed-era signatures
    /// must stay verifiable — and file archival is best effort.
    fn archive_old_key(
        &self,
        store: &AuditStore,
        current: Option<&CurrentKey>,
        new_key_id: &str,
    ) -> AttestResult<()> {
        let current = match current {
            Some(c) if c.key_id != new_key_id => c,
            _ => return Ok(()),
        };

        let old_algorithm = current
            .algorithm
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let revoked_at = format!(
            "{} [migrated:{old_algorithm}->ed25519]",
            Utc::now().to_rfc3339()
        );
        if !store.revoke_key(&current.key_id, &revoked_at)? {
            warn!(key_id = %current.key_id, "old key had no registry row to mark");
        }

        for file in [PRIVATE_KEY_FILE, PUBLIC_KEY_FILE] {
            let path = self.config.key_dir.join(file);
            if path.is_file() {
                let archived = self.config.key_dir.join(format!("{file}.archived"));
                if let Err(e) = std::fs::rename(&path, &archived) {
                    warn!(path = %path.display(), error = %e, "could not archive old key file");
                }
            }
        }

        info!(old_key_id = %current.key_id, "old key archived");
        Ok(())
    }
}

struct CurrentKey {
    key_id: String,
    algorithm: Option<SigningAlgorithm>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use attest_chain::AuditLedger;
    use attest_contracts::{AuditEvent, SigningKeyRecord};
    use attest_signing::{RsaLegacySigner, Signer};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    struct Fixture {
        _root: tempfile::TempDir,
        config: MigrationConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let config = MigrationConfig {
                db_path: root.path().join("audit.db"),
                key_dir: root.path().join("keys"),
                backup_root: root.path().join("backups"),
            };
            std::fs::create_dir_all(&config.key_dir).unwrap();
            Self {
                _root: root,
                config,
            }
        }

        fn open_store(&self) -> AuditStore {
            AuditStore::open(&self.config.db_path).unwrap()
        }

        /// Build an RSA-signed chain of `len` entries, with the RSA keypair
        /// on disk and registered, exactly as a pre-migration deployment
        /// would look.
        fn seed_rsa_chain(&self, len: u64) -> String {
            let mut rsa = RsaLegacySigner::new();
            rsa.generate_keypair().unwrap();
            rsa.save_keypair(&self.config.key_dir).unwrap();
            let rsa_key_id = rsa.key_id().unwrap();

            let store = self.open_store();
            store
                .register_key(&SigningKeyRecord {
                    key_id: rsa_key_id.clone(),
                    public_key: rsa.public_key_pem().unwrap(),
                    algorithm: "rsa_2048_pss".to_string(),
                    key_size: 2048,
                    created_at: "2024-06-01T00:00:00+00:00".to_string(),
                    revoked_at: None,
                })
                .unwrap();

            let mut previous = AuditEntry::GENESIS.to_string();
            for seq in 1..=len {
                let timestamp = format!("2024-06-01T00:00:{seq:02}+00:00");
                let event_data = format!("{{\"step\":{seq}}}");
                let entry_hash =
                    compute_entry_hash(seq, &timestamp, "handler_action", &event_data, &previous);
                let signature = STANDARD.encode(rsa.sign(entry_hash.as_bytes()).unwrap());
                store
                    .append_entry(&AuditEntry {
                        sequence_number: seq,
                        entry_hash: entry_hash.clone(),
                        previous_hash: previous,
                        signature,
                        key_id: rsa_key_id.clone(),
                        timestamp,
                        event_type: "handler_action".to_string(),
                        event_data,
                    })
                    .unwrap();
                previous = entry_hash;
            }
            rsa_key_id
        }

        /// Build an Ed25519 chain through the normal append path.
        fn seed_ed25519_chain(&self, len: u64) -> String {
            let store = Arc::new(self.open_store());
            let key = Arc::new(UnifiedSigningKey::with_key_path(Some(
                self.config.key_dir.join(ED25519_KEY_FILE),
            )));
            let manager = Arc::new(SignatureManager::new(key, Arc::clone(&store)));
            manager.initialize().unwrap();
            let ledger = AuditLedger::new(Arc::clone(&store), Arc::clone(&manager), 0).unwrap();
            for seq in 1..=len {
                ledger
                    .append(&AuditEvent {
                        event_type: "handler_action".to_string(),
                        event_data: format!("{{\"step\":{seq}}}"),
                        timestamp: format!("2025-01-06T12:00:{seq:02}+00:00"),
                    })
                    .unwrap();
            }
            manager.active_key_id().unwrap()
        }

        fn verify_chain(&self) -> bool {
            let store = Arc::new(self.open_store());
            let key = Arc::new(UnifiedSigningKey::with_key_path(Some(
                self.config.key_dir.join(ED25519_KEY_FILE),
            )));
            let manager = Arc::new(SignatureManager::new(key, Arc::clone(&store)));
            manager.initialize().unwrap();
            AuditVerifier::new(store, manager)
                .verify_complete_chain()
                .unwrap()
                .valid
        }
    }

    #[test]
    fn rsa_chain_migrates_and_verifies_under_the_new_key() {
        let fx = Fixture::new();
        let rsa_key_id = fx.seed_rsa_chain(5);

        let result = KeyMigrator::new(fx.config.clone())
            .migrate_to_ed25519()
            .unwrap();

        assert!(result.success, "{}", result.message);
        assert_eq!(result.entries_migrated, 5);
        assert_eq!(result.old_key_id.as_deref(), Some(rsa_key_id.as_str()));
        assert_ne!(result.new_key_id, result.old_key_id);
        assert!(fx.verify_chain());

        // Every rewritten entry carries the new key, gapless from genesis.
        let store = fx.open_store();
        let entries = store.all_entries().unwrap();
        assert_eq!(entries[0].previous_hash, AuditEntry::GENESIS);
        assert!(entries
            .iter()
            .all(|e| e.key_id == *result.new_key_id.as_ref().unwrap()));
    }

    #[test]
    fn old_key_is_archived_not_deleted() {
        let fx = Fixture::new();
        let rsa_key_id = fx.seed_rsa_chain(3);

        KeyMigrator::new(fx.config.clone())
            .migrate_to_ed25519()
            .unwrap();

        let store = fx.open_store();
        let record = store.key_by_id(&rsa_key_id).unwrap().unwrap();
        let revoked_at = record.revoked_at.expect("old key must be revoked");
        assert!(revoked_at.contains("[migrated:rsa_2048_pss->ed25519]"));
        assert!(!record.public_key.is_empty());

        assert!(!fx.config.key_dir.join(PRIVATE_KEY_FILE).exists());
        assert!(fx
            .config
            .key_dir
            .join(format!("{PRIVATE_KEY_FILE}.archived"))
            .is_file());
    }

    #[test]
    fn migration_preserves_event_content_and_timestamps() {
        let fx = Fixture::new();
        fx.seed_rsa_chain(4);
        let before: Vec<_> = fx
            .open_store()
            .all_entries()
            .unwrap()
            .into_iter()
            .map(|e| (e.sequence_number, e.timestamp, e.event_type, e.event_data))
            .collect();

        KeyMigrator::new(fx.config.clone())
            .migrate_to_ed25519()
            .unwrap();

        let after: Vec<_> = fx
            .open_store()
            .all_entries()
            .unwrap()
            .into_iter()
            .map(|e| (e.sequence_number, e.timestamp, e.event_type, e.event_data))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn already_ed25519_chain_is_a_no_op() {
        let fx = Fixture::new();
        let key_id = fx.seed_ed25519_chain(3);
        let before = fx.open_store().all_entries().unwrap();

        let result = KeyMigrator::new(fx.config.clone())
            .migrate_to_ed25519()
            .unwrap();

        assert!(result.success);
        assert_eq!(result.entries_migrated, 0);
        assert_eq!(result.old_key_id.as_deref(), Some(key_id.as_str()));
        assert_eq!(result.old_key_id, result.new_key_id);
        assert_eq!(fx.open_store().all_entries().unwrap(), before);
    }

    #[test]
    fn empty_chain_migrates_trivially() {
        let fx = Fixture::new();
        fx.open_store(); // create the database file

        let result = KeyMigrator::new(fx.config.clone())
            .migrate_to_ed25519()
            .unwrap();

        assert!(result.success);
        assert_eq!(result.entries_migrated, 0);
        assert!(result.new_key_id.is_some());
        assert!(fx.verify_chain());
    }

    #[test]
    fn mid_resign_failure_rolls_back_completely() {
        let fx = Fixture::new();
        let rsa_key_id = fx.seed_rsa_chain(6);
        let before = fx.open_store().all_entries().unwrap();

        let mut migrator = KeyMigrator::new(fx.config.clone());
        migrator.fail_during_resign = true;
        let result = migrator.migrate_to_ed25519().unwrap();

        assert!(!result.success);
        assert!(result.message.contains("rollback succeeded"));
        assert_eq!(result.new_key_id, None);

        // Entries, key registry, and key files are all untouched.
        let store = fx.open_store();
        assert_eq!(store.all_entries().unwrap(), before);
        assert!(store.key_by_id(&rsa_key_id).unwrap().unwrap().is_active());
        assert!(fx.config.key_dir.join(PRIVATE_KEY_FILE).is_file());
        assert!(!fx.config.key_dir.join(ED25519_KEY_FILE).exists());
    }
}
