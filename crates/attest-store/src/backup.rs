//! File-level backup and restore used by key migration.
//!
//! A backup is a timestamped directory containing a copy of the database
//! file and every file in the key directory.  Restore copies them back.
//! Nothing here touches the live connection — migration serializes access
//! before calling in.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use attest_contracts::{AttestError, AttestResult};

/// Handle to a completed backup, used to restore on rollback.
#[derive(Debug, Clone)]
pub struct BackupSet {
    /// The backup directory.
    pub dir: PathBuf,
    db_file: PathBuf,
    key_files: Vec<PathBuf>,
}

fn io_err(op: &'static str, path: &Path, e: std::io::Error) -> AttestError {
    AttestError::Storage {
        op,
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// Copy the database file and all key material into a fresh timestamped
/// directory under `backup_root`.
///
/// Only the top level of `key_dir` is copied — key files are flat files,
/// never nested.
pub fn create_backup(
    db_path: &Path,
    key_dir: &Path,
    backup_root: &Path,
) -> AttestResult<BackupSet> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let dir = backup_root.join(format!("audit_backup_{stamp}"));
    fs::create_dir_all(&dir).map_err(|e| io_err("create backup dir", &dir, e))?;

    let db_file = dir.join(
        db_path
            .file_name()
            .ok_or_else(|| AttestError::Storage {
                op: "create backup",
                path: db_path.display().to_string(),
                reason: "database path has no file name".to_string(),
            })?,
    );
    fs::copy(db_path, &db_file).map_err(|e| io_err("copy database", db_path, e))?;

    let mut key_files = Vec::new();
    if key_dir.is_dir() {
        let entries =
            fs::read_dir(key_dir).map_err(|e| io_err("read key dir", key_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err("read key dir", key_dir, e))?;
            let src = entry.path();
            if src.is_file() {
                let dest = dir.join(entry.file_name());
                fs::copy(&src, &dest).map_err(|e| io_err("copy key file", &src, e))?;
                key_files.push(PathBuf::from(entry.file_name()));
            }
        }
    }

    info!(
        dir = %dir.display(),
        key_files = key_files.len(),
        "migration backup created"
    );
    Ok(BackupSet {
        dir,
        db_file,
        key_files,
    })
}

/// Restore the database file and key directory from a backup.
///
/// Key files that appeared after the backup (e.g. a freshly generated
/// migration key) are removed so the key directory matches its backed-up
/// state.
pub fn restore_backup(set: &BackupSet, db_path: &Path, key_dir: &Path) -> AttestResult<()> {
    fs::copy(&set.db_file, db_path).map_err(|e| io_err("restore database", db_path, e))?;

    if key_dir.is_dir() {
        // Remove files not present in the backup.
        let entries =
            fs::read_dir(key_dir).map_err(|e| io_err("read key dir", key_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err("read key dir", key_dir, e))?;
            let name = PathBuf::from(entry.file_name());
            if entry.path().is_file() && !set.key_files.contains(&name) {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!(path = %entry.path().display(), error = %e, "could not remove stray key file during restore");
                }
            }
        }
    } else {
        fs::create_dir_all(key_dir).map_err(|e| io_err("create key dir", key_dir, e))?;
    }

    for name in &set.key_files {
        let src = set.dir.join(name);
        let dest = key_dir.join(name);
        fs::copy(&src, &dest).map_err(|e| io_err("restore key file", &dest, e))?;
    }

    info!(dir = %set.dir.display(), "migration backup restored");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
