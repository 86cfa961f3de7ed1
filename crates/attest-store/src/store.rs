//! SQLite-backed persistence for entries, signing keys, and root anchors.
//!
//! The store owns a single connection behind a `Mutex`, which makes it
//! `Send + Sync` and serializes all access — appends from the ledger and
//! reads from the verifier interleave safely.  The only multi-row write is
//! [`AuditStore::replace_all_entries`], used by key migration, and it runs
//! inside one transaction so a partial rewrite is never observable.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use attest_contracts::{
    AttestError, AttestResult, AuditEntry, RootAnchor, SigningKeyRecord,
};

/// SQL schema for the three audit tables.
const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS audit_log (
        sequence_number INTEGER PRIMARY KEY,
        entry_hash      TEXT NOT NULL,
        previous_hash   TEXT NOT NULL,
        signature       TEXT NOT NULL,
        key_id          TEXT NOT NULL,
        timestamp       TEXT NOT NULL,
        event_type      TEXT NOT NULL,
        event_data      TEXT NOT NULL,
        CHECK(sequence_number > 0)
    );
    CREATE INDEX IF NOT EXISTS idx_audit_log_event_type ON audit_log(event_type);
    CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);

    CREATE TABLE IF NOT EXISTS audit_signing_keys (
        key_id     TEXT PRIMARY KEY,
        public_key TEXT NOT NULL,
        algorithm  TEXT NOT NULL,
        key_size   INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        revoked_at TEXT
    );

    CREATE TABLE IF NOT EXISTS audit_roots (
        root_id        INTEGER PRIMARY KEY AUTOINCREMENT,
        sequence_start INTEGER NOT NULL,
        sequence_end   INTEGER NOT NULL,
        root_hash      TEXT NOT NULL,
        timestamp      TEXT NOT NULL,
        UNIQUE(sequence_start, sequence_end)
    );
";

/// Column list shared by every entry query so row mapping stays in one place.
const ENTRY_COLUMNS: &str =
    "sequence_number, entry_hash, previous_hash, signature, key_id, timestamp, event_type, event_data";

/// The audit ledger database: entry log, signing-key registry, root anchors.
pub struct AuditStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl AuditStore {
    /// Open (or create) the audit database at `path` and ensure the schema
    /// exists.
    pub fn open(path: impl AsRef<Path>) -> AttestResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)
            .map_err(|e| Self::storage_err("open", &path, e))?;

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Self::storage_err("create schema", &path, e))?;

        info!(path = %path.display(), "audit store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// The filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_err(op: &'static str, path: &Path, e: rusqlite::Error) -> AttestError {
        AttestError::Storage {
            op,
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    fn err(&self, op: &'static str, e: rusqlite::Error) -> AttestError {
        Self::storage_err(op, &self.path, e)
    }

    fn lock(&self) -> AttestResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| AttestError::Storage {
            op: "lock",
            path: self.path.display().to_string(),
            reason: format!("connection lock poisoned: {e}"),
        })
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
        Ok(AuditEntry {
            sequence_number: row.get::<_, i64>(0)? as u64,
            entry_hash: row.get(1)?,
            previous_hash: row.get(2)?,
            signature: row.get(3)?,
            key_id: row.get(4)?,
            timestamp: row.get(5)?,
            event_type: row.get(6)?,
            event_data: row.get(7)?,
        })
    }

    // ── Entry log ─────────────────────────────────────────────────────────────

    /// Append one fully-formed entry.  The caller (the ledger) has already
    /// assigned the sequence number and computed hash and signature.
    pub fn append_entry(&self, entry: &AuditEntry) -> AttestResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO audit_log (sequence_number, entry_hash, previous_hash, signature,
                                    key_id, timestamp, event_type, event_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.sequence_number as i64,
                entry.entry_hash,
                entry.previous_hash,
                entry.signature,
                entry.key_id,
                entry.timestamp,
                entry.event_type,
                entry.event_data,
            ],
        )
        .map_err(|e| self.err("append entry", e))?;
        Ok(())
    }

    /// Fetch a single entry by sequence number.
    pub fn entry_by_sequence(&self, sequence: u64) -> AttestResult<Option<AuditEntry>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM audit_log WHERE sequence_number = ?1"),
            params![sequence as i64],
            Self::row_to_entry,
        )
        .optional()
        .map_err(|e| self.err("read entry", e))
    }

    /// Fetch all entries with `start <= sequence_number <= end`, ascending.
    pub fn entries_in_range(&self, start: u64, end: u64) -> AttestResult<Vec<AuditEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM audit_log
                 WHERE sequence_number >= ?1 AND sequence_number <= ?2
                 ORDER BY sequence_number ASC"
            ))
            .map_err(|e| self.err("read range", e))?;
        let rows = stmt
            .query_map(params![start as i64, end as i64], Self::row_to_entry)
            .map_err(|e| self.err("read range", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| self.err("read range", e))
    }

    /// Fetch every entry in ascending sequence order.
    pub fn all_entries(&self) -> AttestResult<Vec<AuditEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM audit_log ORDER BY sequence_number ASC"
            ))
            .map_err(|e| self.err("read all entries", e))?;
        let rows = stmt
            .query_map([], Self::row_to_entry)
            .map_err(|e| self.err("read all entries", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| self.err("read all entries", e))
    }

    /// The entry with the highest sequence number, if any.
    pub fn last_entry(&self) -> AttestResult<Option<AuditEntry>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM audit_log ORDER BY sequence_number DESC LIMIT 1"
            ),
            [],
            Self::row_to_entry,
        )
        .optional()
        .map_err(|e| self.err("read last entry", e))
    }

    /// Total number of persisted entries.
    pub fn entry_count(&self) -> AttestResult<u64> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as u64)
        .map_err(|e| self.err("count entries", e))
    }

    /// Number of entries carrying a non-empty signature.
    pub fn signed_entry_count(&self) -> AttestResult<u64> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE signature != ''",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
        .map_err(|e| self.err("count signed entries", e))
    }

    /// Lowest and highest sequence numbers, or `None` for an empty log.
    pub fn sequence_range(&self) -> AttestResult<Option<(u64, u64)>> {
        let conn = self.lock()?;
        let range: Option<(i64, i64)> = conn
            .query_row(
                "SELECT MIN(sequence_number), MAX(sequence_number) FROM audit_log",
                [],
                |row| {
                    let min: Option<i64> = row.get(0)?;
                    let max: Option<i64> = row.get(1)?;
                    Ok(min.zip(max))
                },
            )
            .map_err(|e| self.err("read sequence range", e))?;
        Ok(range.map(|(a, b)| (a as u64, b as u64)))
    }

    /// Atomically replace the entire entry log.
    ///
    /// Used only by key migration.  Runs as a single transaction: either
    /// every old row is gone and every new row is in place, or nothing
    /// changed.
    pub fn replace_all_entries(&self, entries: &[AuditEntry]) -> AttestResult<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| self.err("begin rewrite", e))?;

        tx.execute("DELETE FROM audit_log", [])
            .map_err(|e| self.err("clear entries", e))?;
        for entry in entries {
            tx.execute(
                "INSERT INTO audit_log (sequence_number, entry_hash, previous_hash, signature,
                                        key_id, timestamp, event_type, event_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.sequence_number as i64,
                    entry.entry_hash,
                    entry.previous_hash,
                    entry.signature,
                    entry.key_id,
                    entry.timestamp,
                    entry.event_type,
                    entry.event_data,
                ],
            )
            .map_err(|e| self.err("rewrite entry", e))?;
        }

        tx.commit().map_err(|e| self.err("commit rewrite", e))?;
        info!(entries = entries.len(), "entry log rewritten atomically");
        Ok(())
    }

    // ── Signing-key registry ──────────────────────────────────────────────────

    /// Register a public key.  Idempotent: registering an already-known
    /// `key_id` is a no-op, not an error.
    pub fn register_key(&self, record: &SigningKeyRecord) -> AttestResult<()> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO audit_signing_keys
                     (key_id, public_key, algorithm, key_size, created_at, revoked_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.key_id,
                    record.public_key,
                    record.algorithm,
                    record.key_size,
                    record.created_at,
                    record.revoked_at,
                ],
            )
            .map_err(|e| self.err("register key", e))?;
        if inserted > 0 {
            info!(key_id = %record.key_id, algorithm = %record.algorithm, "signing key registered");
        } else {
            debug!(key_id = %record.key_id, "signing key already registered");
        }
        Ok(())
    }

    /// Look up a key by id.
    pub fn key_by_id(&self, key_id: &str) -> AttestResult<Option<SigningKeyRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT key_id, public_key, algorithm, key_size, created_at, revoked_at
             FROM audit_signing_keys WHERE key_id = ?1",
            params![key_id],
            |row| {
                Ok(SigningKeyRecord {
                    key_id: row.get(0)?,
                    public_key: row.get(1)?,
                    algorithm: row.get(2)?,
                    key_size: row.get::<_, i64>(3)? as u32,
                    created_at: row.get(4)?,
                    revoked_at: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(|e| self.err("read key", e))
    }

    /// Stamp `revoked_at` on a key.  The public material stays queryable so
    /// historical signatures remain verifiable.  Returns `false` when no
    /// such key exists.
    pub fn revoke_key(&self, key_id: &str, revoked_at: &str) -> AttestResult<bool> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE audit_signing_keys SET revoked_at = ?2 WHERE key_id = ?1",
                params![key_id, revoked_at],
            )
            .map_err(|e| self.err("revoke key", e))?;
        Ok(updated > 0)
    }

    // ── Root anchors ──────────────────────────────────────────────────────────

    /// Persist a root anchor checkpoint.
    pub fn add_root_anchor(&self, anchor: &RootAnchor) -> AttestResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO audit_roots (sequence_start, sequence_end, root_hash, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                anchor.sequence_start as i64,
                anchor.sequence_end as i64,
                anchor.root_hash,
                anchor.timestamp,
            ],
        )
        .map_err(|e| self.err("add root anchor", e))?;
        Ok(())
    }

    /// All stored anchors, ordered by covered range.
    pub fn root_anchors(&self) -> AttestResult<Vec<RootAnchor>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT sequence_start, sequence_end, root_hash, timestamp
                 FROM audit_roots ORDER BY sequence_start ASC",
            )
            .map_err(|e| self.err("read root anchors", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RootAnchor {
                    sequence_start: row.get::<_, i64>(0)? as u64,
                    sequence_end: row.get::<_, i64>(1)? as u64,
                    root_hash: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })
            .map_err(|e| self.err("read root anchors", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| self.err("read root anchors", e))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entry(sequence: u64, previous_hash: &str) -> AuditEntry {
        AuditEntry {
            sequence_number: sequence,
            entry_hash: format!("hash-{sequence}"),
            previous_hash: previous_hash.to_string(),
            signature: format!("sig-{sequence}"),
            key_id: "agent-0123456789ab".to_string(),
            timestamp: "2025-01-06T12:00:00+00:00".to_string(),
            event_type: "test_event".to_string(),
            event_data: format!("payload {sequence}"),
        }
    }

    fn open_temp_store() -> (tempfile::TempDir, AuditStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AuditStore::open(dir.path().join("audit.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn append_and_read_back() {
        let (_dir, store) = open_temp_store();
        store.append_entry(&test_entry(1, AuditEntry::GENESIS)).unwrap();
        store.append_entry(&test_entry(2, "hash-1")).unwrap();

        assert_eq!(store.entry_count().unwrap(), 2);
        let entry = store.entry_by_sequence(2).unwrap().unwrap();
        assert_eq!(entry.previous_hash, "hash-1");
        assert_eq!(store.last_entry().unwrap().unwrap().sequence_number, 2);
        assert_eq!(store.sequence_range().unwrap(), Some((1, 2)));
    }

    #[test]
    fn missing_entry_reads_as_none() {
        let (_dir, store) = open_temp_store();
        assert!(store.entry_by_sequence(99).unwrap().is_none());
        assert!(store.last_entry().unwrap().is_none());
        assert_eq!(store.sequence_range().unwrap(), None);
    }

    #[test]
    fn range_query_is_inclusive_and_ordered() {
        let (_dir, store) = open_temp_store();
        let mut prev = AuditEntry::GENESIS.to_string();
        for seq in 1..=5 {
            store.append_entry(&test_entry(seq, &prev)).unwrap();
            prev = format!("hash-{seq}");
        }

        let range = store.entries_in_range(2, 4).unwrap();
        let sequences: Vec<u64> = range.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequences, vec![2, 3, 4]);
    }

    #[test]
    fn replace_all_entries_is_total() {
        let (_dir, store) = open_temp_store();
        store.append_entry(&test_entry(1, AuditEntry::GENESIS)).unwrap();
        store.append_entry(&test_entry(2, "hash-1")).unwrap();

        let mut rewritten = test_entry(1, AuditEntry::GENESIS);
        rewritten.entry_hash = "new-hash-1".to_string();
        store.replace_all_entries(&[rewritten.clone()]).unwrap();

        assert_eq!(store.entry_count().unwrap(), 1);
        assert_eq!(
            store.entry_by_sequence(1).unwrap().unwrap().entry_hash,
            "new-hash-1"
        );
    }

    #[test]
    fn key_registration_is_idempotent() {
        let (_dir, store) = open_temp_store();
        let record = SigningKeyRecord {
            key_id: "agent-0123456789ab".to_string(),
            public_key: "cHVibGlj".to_string(),
            algorithm: "ed25519".to_string(),
            key_size: 256,
            created_at: "2025-01-06T12:00:00+00:00".to_string(),
            revoked_at: None,
        };

        store.register_key(&record).unwrap();
        // Second registration must be a no-op, not an error.
        store.register_key(&record).unwrap();

        let loaded = store.key_by_id(&record.key_id).unwrap().unwrap();
        assert_eq!(loaded.algorithm, "ed25519");
        assert!(loaded.is_active());
    }

    #[test]
    fn revoked_key_keeps_public_material() {
        let (_dir, store) = open_temp_store();
        let record = SigningKeyRecord {
            key_id: "agent-aaaaaaaaaaaa".to_string(),
            public_key: "cHVibGlj".to_string(),
            algorithm: "rsa_2048_pss".to_string(),
            key_size: 2048,
            created_at: "2025-01-06T12:00:00+00:00".to_string(),
            revoked_at: None,
        };
        store.register_key(&record).unwrap();

        let revoked = store
            .revoke_key(&record.key_id, "2025-02-01T00:00:00+00:00")
            .unwrap();
        assert!(revoked);

        let loaded = store.key_by_id(&record.key_id).unwrap().unwrap();
        assert!(!loaded.is_active());
        assert_eq!(loaded.public_key, "cHVibGlj");

        // Revoking an unknown key reports false rather than failing.
        assert!(!store.revoke_key("agent-ffffffffffff", "now").unwrap());
    }

    #[test]
    fn root_anchors_round_trip() {
        let (_dir, store) = open_temp_store();
        assert!(store.root_anchors().unwrap().is_empty());

        let anchor = RootAnchor {
            sequence_start: 1,
            sequence_end: 100,
            root_hash: "roothash".to_string(),
            timestamp: "2025-01-06T12:00:00+00:00".to_string(),
        };
        store.add_root_anchor(&anchor).unwrap();

        let anchors = store.root_anchors().unwrap();
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0], anchor);
    }
}
