//! Ed25519 signer: the current default algorithm.
//!
//! Key storage is a raw 32-byte private key file with 0o600 permissions.
//! Signatures are 64 bytes and fully deterministic — signing the same data
//! twice with the same key yields byte-identical output, which downstream
//! consumers rely on.

use std::io::Write;
use std::path::Path;

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use tracing::{debug, info};
use zeroize::Zeroizing;

use attest_contracts::{AttestError, AttestResult, SigningAlgorithm};

use crate::protocol::{compute_key_id, Signer};

/// Ed25519 signing implementation over a raw 32-byte key file.
#[derive(Default)]
pub struct Ed25519Signer {
    signing_key: Option<SigningKey>,
    key_id: Option<String>,
}

impl Ed25519Signer {
    /// Create an uninitialized signer.  Call `generate_keypair`,
    /// `load_keypair`, or [`Ed25519Signer::from_private_key_bytes`] before
    /// signing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a key from raw 32-byte private key material (e.g. a
    /// registry-provisioned key).
    pub fn from_private_key_bytes(bytes: &[u8]) -> AttestResult<Self> {
        if bytes.len() != 32 {
            return Err(AttestError::InvalidKey {
                reason: format!("expected 32-byte Ed25519 private key, got {}", bytes.len()),
            });
        }
        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(bytes);
        let signing_key = SigningKey::from_bytes(&secret);
        let key_id = compute_key_id(signing_key.verifying_key().as_bytes());
        Ok(Self {
            signing_key: Some(signing_key),
            key_id: Some(key_id),
        })
    }

    fn key(&self) -> AttestResult<&SigningKey> {
        self.signing_key
            .as_ref()
            .ok_or(AttestError::UninitializedSigner)
    }

    /// Verify a signature against a bare 32-byte Ed25519 public key.
    ///
    /// Used by the signature manager to check entries signed by retired
    /// keys whose material lives only in the registry.
    pub fn verify_with_public_key(
        public_key_bytes: &[u8],
        data: &[u8],
        signature: &[u8],
    ) -> bool {
        let key_bytes: [u8; 32] = match public_key_bytes.try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        let verifying_key = match VerifyingKey::from_bytes(&key_bytes) {
            Ok(k) => k,
            Err(_) => return false,
        };
        let sig_bytes: [u8; 64] = match signature.try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        verifying_key
            .verify(data, &Signature::from_bytes(&sig_bytes))
            .is_ok()
    }
}

impl Signer for Ed25519Signer {
    fn algorithm(&self) -> SigningAlgorithm {
        SigningAlgorithm::Ed25519
    }

    fn key_id(&self) -> AttestResult<String> {
        self.key_id
            .clone()
            .ok_or(AttestError::UninitializedSigner)
    }

    fn public_key_bytes(&self) -> AttestResult<Vec<u8>> {
        Ok(self.key()?.verifying_key().as_bytes().to_vec())
    }

    fn sign(&self, data: &[u8]) -> AttestResult<Vec<u8>> {
        Ok(self.key()?.sign(data).to_bytes().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let key = match self.signing_key.as_ref() {
            Some(k) => k,
            None => return false,
        };
        let sig_bytes: [u8; 64] = match signature.try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        key.verifying_key()
            .verify(data, &Signature::from_bytes(&sig_bytes))
            .is_ok()
    }

    fn generate_keypair(&mut self) -> AttestResult<()> {
        let signing_key = SigningKey::generate(&mut OsRng);
        self.key_id = Some(compute_key_id(signing_key.verifying_key().as_bytes()));
        self.signing_key = Some(signing_key);
        info!(key_id = %self.key_id.as_deref().unwrap_or(""), "generated new Ed25519 keypair");
        Ok(())
    }

    fn load_keypair(&mut self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        let bytes = match std::fs::read(path) {
            Ok(b) => Zeroizing::new(b),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "could not read Ed25519 key file");
                return false;
            }
        };
        match Self::from_private_key_bytes(&bytes) {
            Ok(loaded) => {
                *self = loaded;
                info!(
                    path = %path.display(),
                    key_id = %self.key_id.as_deref().unwrap_or(""),
                    "loaded Ed25519 keypair"
                );
                true
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "invalid Ed25519 key file");
                false
            }
        }
    }

    fn save_keypair(&self, path: &Path) -> AttestResult<()> {
        let key = self.key()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AttestError::Storage {
                op: "create key dir",
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        let io = |op: &'static str, e: std::io::Error| AttestError::Storage {
            op,
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        // Create with 0o600 from the start so there is no world-readable
        // window between write and chmod.
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path).map_err(|e| io("create key file", e))?;
        let secret = Zeroizing::new(key.to_bytes());
        file.write_all(secret.as_slice())
            .map_err(|e| io("write key file", e))?;

        info!(path = %path.display(), "saved Ed25519 keypair");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn generated() -> Ed25519Signer {
        let mut signer = Ed25519Signer::new();
        signer.generate_keypair().unwrap();
        signer
    }

    #[test]
    fn uninitialized_signer_fails_loudly() {
        let signer = Ed25519Signer::new();
        assert!(matches!(
            signer.sign(b"data"),
            Err(AttestError::UninitializedSigner)
        ));
        assert!(matches!(
            signer.key_id(),
            Err(AttestError::UninitializedSigner)
        ));
        assert!(matches!(
            signer.public_key_bytes(),
            Err(AttestError::UninitializedSigner)
        ));
        // verify is a predicate even here.
        assert!(!signer.verify(b"data", &[0u8; 64]));
    }

    #[test]
    fn sign_verify_round_trip() {
        let signer = generated();
        let sig = signer.sign(b"audit entry hash").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(signer.verify(b"audit entry hash", &sig));
        assert!(!signer.verify(b"different data", &sig));
    }

    #[test]
    fn signatures_are_deterministic() {
        let signer = generated();
        let sig1 = signer.sign(b"same input").unwrap();
        let sig2 = signer.sign(b"same input").unwrap();
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn corrupting_any_bit_breaks_verification() {
        let signer = generated();
        let sig = signer.sign(b"payload").unwrap();
        for byte in 0..sig.len() {
            let mut corrupted = sig.clone();
            corrupted[byte] ^= 0x01;
            assert!(
                !signer.verify(b"payload", &corrupted),
                "bit flip in byte {byte} went undetected"
            );
        }
    }

    #[test]
    fn malformed_signature_is_false_not_error() {
        let signer = generated();
        assert!(!signer.verify(b"data", b""));
        assert!(!signer.verify(b"data", b"short"));
        assert!(!signer.verify(b"data", &[0u8; 63]));
        assert!(!signer.verify(b"data", &[0u8; 65]));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("agent_signing.key");

        let signer = generated();
        signer.save_keypair(&key_path).unwrap();

        // Raw 32-byte file with owner-only permissions.
        let metadata = std::fs::metadata(&key_path).unwrap();
        assert_eq!(metadata.len(), 32);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }

        let mut loaded = Ed25519Signer::new();
        assert!(loaded.load_keypair(&key_path));
        assert_eq!(loaded.key_id().unwrap(), signer.key_id().unwrap());

        // A signature from the original key verifies under the loaded one.
        let sig = signer.sign(b"cross-instance").unwrap();
        assert!(loaded.verify(b"cross-instance", &sig));
    }

    #[test]
    fn load_missing_or_invalid_file_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let mut signer = Ed25519Signer::new();
        assert!(!signer.load_keypair(&dir.path().join("absent.key")));

        let bad = dir.path().join("bad.key");
        std::fs::write(&bad, b"not 32 bytes").unwrap();
        assert!(!signer.load_keypair(&bad));
    }

    #[test]
    fn verify_with_registry_public_key() {
        let signer = generated();
        let public = signer.public_key_bytes().unwrap();
        let sig = signer.sign(b"registry path").unwrap();

        assert!(Ed25519Signer::verify_with_public_key(&public, b"registry path", &sig));
        assert!(!Ed25519Signer::verify_with_public_key(&public, b"other", &sig));
        assert!(!Ed25519Signer::verify_with_public_key(b"bad key", b"registry path", &sig));
    }
}
