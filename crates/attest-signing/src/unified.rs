//! The process-wide unified signing key.
//!
//! Exactly one active key signs for every subsystem in the process — audit
//! entries, trace signing, registration payloads.  The key is an explicit,
//! caller-constructed handle (`Arc<UnifiedSigningKey>`) passed into every
//! component that signs; there is no language-level global.
//!
//! On first use the key searches an ordered list of candidate file paths,
//! loads the first existing key, or generates a fresh Ed25519 keypair and
//! persists it to the first writable candidate.  Re-initialization is
//! idempotent.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use tracing::{debug, info, warn};

use attest_contracts::{
    AttestError, AttestResult, RegistrationPayload, SigningAlgorithm,
};

use crate::ed25519::Ed25519Signer;
use crate::protocol::Signer;

/// Default key location relative to the working directory.
pub const DEFAULT_KEY_PATH: &str = "data/agent_signing.key";
/// Key location inside container deployments.
pub const DOCKER_KEY_PATH: &str = "/app/data/agent_signing.key";

struct Inner {
    signer: Ed25519Signer,
    initialized: bool,
    /// The path the key was loaded from or saved to.
    key_path: Option<PathBuf>,
}

/// The single active signing key shared by all signing consumers.
pub struct UnifiedSigningKey {
    inner: Mutex<Inner>,
    candidates: Vec<PathBuf>,
}

impl UnifiedSigningKey {
    /// Create a handle with the default candidate path list.
    pub fn new() -> Self {
        Self::with_key_path(None)
    }

    /// Create a handle, optionally prepending an explicit key path to the
    /// candidate list.
    pub fn with_key_path(key_path: Option<PathBuf>) -> Self {
        let mut candidates = Vec::new();
        if let Some(path) = key_path {
            candidates.push(path);
        }
        candidates.push(PathBuf::from(DEFAULT_KEY_PATH));
        candidates.push(PathBuf::from(DOCKER_KEY_PATH));
        Self {
            inner: Mutex::new(Inner {
                signer: Ed25519Signer::new(),
                initialized: false,
                key_path: None,
            }),
            candidates,
        }
    }

    fn lock(&self) -> AttestResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|e| AttestError::AppendFailed {
            reason: format!("signing key lock poisoned: {e}"),
        })
    }

    /// Load or generate the key.  Idempotent: a second call never
    /// regenerates or reloads.
    pub fn initialize(&self) -> AttestResult<()> {
        let mut inner = self.lock()?;
        if inner.initialized {
            return Ok(());
        }

        for candidate in &self.candidates {
            if inner.signer.load_keypair(candidate) {
                inner.key_path = Some(candidate.clone());
                inner.initialized = true;
                return Ok(());
            }
        }

        info!("no unified signing key found, generating new Ed25519 keypair");
        inner.signer.generate_keypair()?;

        let mut saved = false;
        for candidate in &self.candidates {
            match inner.signer.save_keypair(candidate) {
                Ok(()) => {
                    inner.key_path = Some(candidate.clone());
                    saved = true;
                    break;
                }
                Err(e) => {
                    debug!(path = %candidate.display(), error = %e, "could not save key to candidate path");
                }
            }
        }
        if !saved {
            warn!("generated key could not be persisted to any candidate path; key is in-memory only");
        }

        inner.initialized = true;
        Ok(())
    }

    /// Install a registry-provisioned raw Ed25519 private key (base64 of 32
    /// bytes) as the active key and persist it to `save_path`.
    pub fn load_provisioned_key(
        &self,
        private_key_b64: &str,
        save_path: Option<&Path>,
    ) -> AttestResult<()> {
        let bytes = STANDARD
            .decode(private_key_b64)
            .map_err(|e| AttestError::InvalidKey {
                reason: format!("provisioned key is not valid base64: {e}"),
            })?;
        let signer = Ed25519Signer::from_private_key_bytes(&bytes)?;

        let target = save_path
            .map(Path::to_path_buf)
            .or_else(|| self.candidates.first().cloned());
        if let Some(path) = &target {
            if let Err(e) = signer.save_keypair(path) {
                warn!(path = %path.display(), error = %e, "could not persist provisioned key");
            }
        }

        let mut inner = self.lock()?;
        inner.key_path = target;
        inner.signer = signer;
        inner.initialized = true;
        info!(key_id = %inner.signer.key_id()?, "provisioned signing key installed");
        Ok(())
    }

    /// The active key's identifier.
    pub fn key_id(&self) -> AttestResult<String> {
        self.lock()?.signer.key_id()
    }

    /// The active key's algorithm.
    pub fn algorithm(&self) -> SigningAlgorithm {
        SigningAlgorithm::Ed25519
    }

    /// Raw public key bytes.
    pub fn public_key_bytes(&self) -> AttestResult<Vec<u8>> {
        self.lock()?.signer.public_key_bytes()
    }

    /// Standard-base64 public key.
    pub fn public_key_base64(&self) -> AttestResult<String> {
        self.lock()?.signer.public_key_base64()
    }

    /// The path the key was loaded from or saved to, once initialized.
    pub fn key_path(&self) -> AttestResult<Option<PathBuf>> {
        Ok(self.lock()?.key_path.clone())
    }

    /// Sign data, returning raw signature bytes.
    pub fn sign(&self, data: &[u8]) -> AttestResult<Vec<u8>> {
        self.lock()?.signer.sign(data)
    }

    /// Sign data, returning an unpadded URL-safe base64 signature — the
    /// form downstream consumers exchange.
    pub fn sign_base64(&self, data: &[u8]) -> AttestResult<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.sign(data)?))
    }

    /// Verify raw signature bytes against data.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        match self.lock() {
            Ok(inner) => inner.signer.verify(data, signature),
            Err(_) => false,
        }
    }

    /// Verify an URL-safe base64 signature, restoring padding if the
    /// producer stripped it.  Malformed base64 is `false`, never an error.
    pub fn verify_base64(&self, data: &[u8], signature_b64: &str) -> bool {
        let decoded = URL_SAFE_NO_PAD
            .decode(signature_b64.trim_end_matches('='))
            .or_else(|_| URL_SAFE.decode(signature_b64));
        match decoded {
            Ok(signature) => self.verify(data, &signature),
            Err(_) => false,
        }
    }

    /// Payload for registering this key with an external key registry.
    pub fn registration_payload(&self, description: &str) -> AttestResult<RegistrationPayload> {
        Ok(RegistrationPayload {
            key_id: self.key_id()?,
            public_key_base64: self.public_key_base64()?,
            algorithm: self.algorithm().as_str().to_string(),
            description: description.to_string(),
        })
    }
}

impl Default for UnifiedSigningKey {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn key_in(dir: &tempfile::TempDir) -> UnifiedSigningKey {
        UnifiedSigningKey::with_key_path(Some(dir.path().join("agent_signing.key")))
    }

    #[test]
    fn initialize_generates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let key = key_in(&dir);
        key.initialize().unwrap();

        assert!(dir.path().join("agent_signing.key").is_file());
        assert!(key.key_id().unwrap().starts_with("agent-"));
        assert_eq!(key.algorithm(), SigningAlgorithm::Ed25519);
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let key = key_in(&dir);
        key.initialize().unwrap();
        let first_id = key.key_id().unwrap();

        key.initialize().unwrap();
        assert_eq!(key.key_id().unwrap(), first_id);
    }

    #[test]
    fn second_handle_loads_the_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let key = key_in(&dir);
        key.initialize().unwrap();

        let reloaded = key_in(&dir);
        reloaded.initialize().unwrap();
        assert_eq!(reloaded.key_id().unwrap(), key.key_id().unwrap());
    }

    #[test]
    fn base64_round_trip_is_url_safe_unpadded() {
        let dir = tempfile::tempdir().unwrap();
        let key = key_in(&dir);
        key.initialize().unwrap();

        let sig = key.sign_base64(b"trace payload").unwrap();
        assert!(!sig.contains('='), "signature must be unpadded");
        assert!(!sig.contains('+') && !sig.contains('/'), "signature must be URL-safe");

        assert!(key.verify_base64(b"trace payload", &sig));
        assert!(!key.verify_base64(b"other payload", &sig));
        assert!(!key.verify_base64(b"trace payload", "@@not-base64@@"));

        // A padded producer is still accepted.
        let padded = format!("{sig}{}", "=".repeat((4 - sig.len() % 4) % 4));
        assert!(key.verify_base64(b"trace payload", &padded));
    }

    #[test]
    fn registration_payload_carries_key_material() {
        let dir = tempfile::tempdir().unwrap();
        let key = key_in(&dir);
        key.initialize().unwrap();

        let payload = key.registration_payload("test agent").unwrap();
        assert_eq!(payload.key_id, key.key_id().unwrap());
        assert_eq!(payload.algorithm, "ed25519");
        assert_eq!(payload.description, "test agent");
        assert_eq!(
            STANDARD.decode(payload.public_key_base64).unwrap().len(),
            32
        );
    }

    #[test]
    fn provisioned_key_replaces_active_key() {
        let dir = tempfile::tempdir().unwrap();
        let key = key_in(&dir);
        key.initialize().unwrap();
        let generated_id = key.key_id().unwrap();

        // Provision a specific key and check it takes over.
        let provisioned = STANDARD.encode([7u8; 32]);
        let save_path = dir.path().join("provisioned.key");
        key.load_provisioned_key(&provisioned, Some(&save_path)).unwrap();

        assert_ne!(key.key_id().unwrap(), generated_id);
        assert!(save_path.is_file());

        // Bad material is rejected.
        assert!(key.load_provisioned_key("too-short", None).is_err());
    }
}
