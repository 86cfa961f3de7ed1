//! CLI configuration, loaded from a TOML file with sensible defaults.
//!
//! Every field is explicit and typed; unknown keys are rejected so a typo
//! in a config file fails loudly instead of silently falling back to a
//! default.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use attest_contracts::{AttestError, AttestResult};

/// Top-level CLI configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub storage: StorageConfig,
    pub signing: SigningConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// The audit database file.
    pub db_path: PathBuf,
    /// Where migration backups are created.
    pub backup_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SigningConfig {
    /// Directory holding key files (the unified Ed25519 key and any
    /// archived legacy keys).
    pub key_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Entries between root anchors; `0` disables anchoring.
    pub anchor_interval: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/audit.db"),
            backup_dir: PathBuf::from("data/backups"),
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            key_dir: PathBuf::from("data"),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            anchor_interval: 100,
        }
    }
}

impl Config {
    /// Parse a TOML document into a `Config`.
    pub fn from_toml_str(s: &str) -> AttestResult<Self> {
        toml::from_str(s).map_err(|e| AttestError::ConfigError {
            reason: format!("failed to parse config TOML: {e}"),
        })
    }

    /// Read and parse the config file at `path`.
    pub fn from_file(path: &Path) -> AttestResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AttestError::ConfigError {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// The unified Ed25519 key file inside the key directory.
    pub fn key_path(&self) -> PathBuf {
        self.signing.key_dir.join("agent_signing.key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.storage.db_path, PathBuf::from("data/audit.db"));
        assert_eq!(config.signing.key_dir, PathBuf::from("data"));
        assert_eq!(config.ledger.anchor_interval, 100);
    }

    #[test]
    fn partial_override() {
        let config = Config::from_toml_str(
            "[storage]\ndb_path = \"/var/lib/attest/audit.db\"\n\n[ledger]\nanchor_interval = 500\n",
        )
        .unwrap();
        assert_eq!(
            config.storage.db_path,
            PathBuf::from("/var/lib/attest/audit.db")
        );
        assert_eq!(config.storage.backup_dir, PathBuf::from("data/backups"));
        assert_eq!(config.ledger.anchor_interval, 500);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml_str("[storage]\ndb = \"oops\"\n").is_err());
    }
}
