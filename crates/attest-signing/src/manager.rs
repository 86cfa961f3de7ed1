//! The signature manager: key lifecycle plus sign/verify over entry hashes.
//!
//! The manager owns nothing cryptographic itself — it holds a handle to the
//! unified signing key for the fast path and consults the key registry for
//! everything else.  Verification of an entry signed by a retired key
//! dispatches on the *stored* algorithm tag, so chains written before a
//! migration stay verifiable forever.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use tracing::{debug, info, warn};

use attest_contracts::verification::KeyInfo;
use attest_contracts::{AttestResult, SigningAlgorithm, SigningKeyRecord};
use attest_store::AuditStore;

use crate::ed25519::Ed25519Signer;
use crate::rsa_legacy::RsaLegacySigner;
use crate::unified::UnifiedSigningKey;

/// Binds the active signing key to the audit store's key registry and
/// provides sign/verify over entry hashes.
pub struct SignatureManager {
    key: Arc<UnifiedSigningKey>,
    store: Arc<AuditStore>,
}

impl SignatureManager {
    /// Create a manager over an existing key handle and store.  Call
    /// [`SignatureManager::initialize`] before signing.
    pub fn new(key: Arc<UnifiedSigningKey>, store: Arc<AuditStore>) -> Self {
        Self { key, store }
    }

    /// Load-or-generate the active key, then register its public key in the
    /// registry.  Idempotent: re-initializing and re-registering are both
    /// no-ops.
    pub fn initialize(&self) -> AttestResult<()> {
        self.key.initialize()?;

        let record = SigningKeyRecord {
            key_id: self.key.key_id()?,
            public_key: self.key.public_key_base64()?,
            algorithm: self.key.algorithm().as_str().to_string(),
            key_size: self.key.algorithm().key_size_bits(),
            created_at: Utc::now().to_rfc3339(),
            revoked_at: None,
        };
        self.store.register_key(&record)?;

        debug!(key_id = %record.key_id, "signature manager initialized");
        Ok(())
    }

    /// The active key's identifier.
    pub fn active_key_id(&self) -> AttestResult<String> {
        self.key.key_id()
    }

    /// The unified key handle this manager signs with.
    pub fn signing_key(&self) -> &Arc<UnifiedSigningKey> {
        &self.key
    }

    /// Sign an entry hash with the active key, returning a standard-base64
    /// signature — the form persisted in the `signature` column.
    pub fn sign_entry(&self, entry_hash: &str) -> AttestResult<String> {
        Ok(STANDARD.encode(self.key.sign(entry_hash.as_bytes())?))
    }

    /// Verify a base64 signature over an entry hash.
    ///
    /// With no `key_id`, or one matching the active key, verification runs
    /// directly against the in-memory key.  Otherwise the named key's
    /// algorithm and public material are looked up in the registry and the
    /// matching verifier is dispatched.  Missing keys, unknown algorithms,
    /// and malformed base64 are all `false`, never an error.
    pub fn verify_signature(
        &self,
        entry_hash: &str,
        signature_b64: &str,
        key_id: Option<&str>,
    ) -> bool {
        let signature = match STANDARD.decode(signature_b64) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let active_id = self.key.key_id().ok();
        let use_active = match key_id {
            None => true,
            Some(id) => active_id.as_deref() == Some(id),
        };
        if use_active {
            return self.key.verify(entry_hash.as_bytes(), &signature);
        }

        // Registry path: an entry signed by a retired key.
        let key_id = key_id.unwrap_or_default();
        let record = match self.store.key_by_id(key_id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(key_id, "signature references unknown key");
                return false;
            }
            Err(e) => {
                warn!(key_id, error = %e, "could not read key registry");
                return false;
            }
        };

        match SigningAlgorithm::parse(&record.algorithm) {
            Some(SigningAlgorithm::Ed25519) => {
                let public = match STANDARD.decode(&record.public_key) {
                    Ok(bytes) => bytes,
                    Err(_) => return false,
                };
                Ed25519Signer::verify_with_public_key(&public, entry_hash.as_bytes(), &signature)
            }
            Some(SigningAlgorithm::Rsa2048Pss) => RsaLegacySigner::verify_with_public_key_pem(
                &record.public_key,
                entry_hash.as_bytes(),
                &signature,
            ),
            None => {
                debug!(key_id, algorithm = %record.algorithm, "unknown signing algorithm");
                false
            }
        }
    }

    /// Key rotation is disabled under the unified-key design: every
    /// historical signature is bound to the active key, so a rotation
    /// without re-signing the chain would break verification.  Use the
    /// migration procedure instead.
    pub fn rotate_keys(&self) -> AttestResult<String> {
        let current = self.active_key_id()?;
        warn!(
            key_id = %current,
            "key rotation is disabled under the unified-key design; use key migration"
        );
        Ok(current)
    }

    /// Stamp `revoked_at` on a registry key.  The public material stays in
    /// place so historical signatures remain verifiable.
    pub fn revoke_key(&self, key_id: &str) -> AttestResult<bool> {
        let revoked = self.store.revoke_key(key_id, &Utc::now().to_rfc3339())?;
        if revoked {
            info!(key_id, "signing key revoked");
        } else {
            warn!(key_id, "revoke requested for unknown key");
        }
        Ok(revoked)
    }

    /// Metadata about the active key, including whether its registry row
    /// has been revoked out from under it.
    pub fn key_info(&self) -> AttestResult<Option<KeyInfo>> {
        let key_id = self.active_key_id()?;
        Ok(self.store.key_by_id(&key_id)?.map(|record| KeyInfo {
            active: record.is_active(),
            revoked: !record.is_active(),
            key_id: record.key_id,
            algorithm: record.algorithm,
            key_size: record.key_size,
            created_at: record.created_at,
        }))
    }

    /// Self-check: sign a probe value and verify it back through the full
    /// dispatch path.
    pub fn test_signing(&self) -> AttestResult<bool> {
        let probe = "signature-manager-self-test";
        let signature = self.sign_entry(probe)?;
        Ok(self.verify_signature(probe, &signature, Some(&self.active_key_id()?)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
