//! Legacy RSA-2048-PSS signer.
//!
//! Retained for two purposes: verifying signatures on chains written before
//! the Ed25519 migration, and producing pre-migration fixtures in tests.
//! New chains never sign with this algorithm.
//!
//! Parameters match the historical deployment: SHA-256 digest, MGF1 with
//! SHA-256, and maximum-length salt.  Signatures are therefore randomized —
//! unlike Ed25519, two signatures over the same data differ.

use std::path::Path;

use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use attest_contracts::{AttestError, AttestResult, SigningAlgorithm};

use crate::protocol::{compute_key_id, Signer};

/// Private key file name inside the key directory.
pub const PRIVATE_KEY_FILE: &str = "audit_private.pem";
/// Public key file name inside the key directory.
pub const PUBLIC_KEY_FILE: &str = "audit_public.pem";

/// Maximum PSS salt length for a 2048-bit modulus with SHA-256:
/// emLen (256) - hLen (32) - 2.
const MAX_SALT_LEN: usize = 222;

fn pss() -> Pss {
    Pss::new_with_salt::<Sha256>(MAX_SALT_LEN)
}

/// RSA-2048-PSS signing implementation over PEM key files.
///
/// `load_keypair`/`save_keypair` take the key *directory*; the file names
/// inside it are fixed ([`PRIVATE_KEY_FILE`], [`PUBLIC_KEY_FILE`]).
#[derive(Default)]
pub struct RsaLegacySigner {
    private_key: Option<RsaPrivateKey>,
    public_key: Option<RsaPublicKey>,
    key_id: Option<String>,
}

impl RsaLegacySigner {
    /// Create an uninitialized signer.
    pub fn new() -> Self {
        Self::default()
    }

    fn private(&self) -> AttestResult<&RsaPrivateKey> {
        self.private_key
            .as_ref()
            .ok_or(AttestError::UninitializedSigner)
    }

    fn spki_der(public_key: &RsaPublicKey) -> AttestResult<Vec<u8>> {
        public_key
            .to_public_key_der()
            .map(|der| der.as_bytes().to_vec())
            .map_err(|e| AttestError::InvalidKey {
                reason: format!("could not encode RSA public key: {e}"),
            })
    }

    /// The public key as PEM text, the form stored in the key registry.
    pub fn public_key_pem(&self) -> AttestResult<String> {
        let public = self
            .public_key
            .as_ref()
            .ok_or(AttestError::UninitializedSigner)?;
        public
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| AttestError::InvalidKey {
                reason: format!("could not encode RSA public key: {e}"),
            })
    }

    /// Verify a signature against a PEM-encoded public key from the
    /// registry.  A malformed PEM, wrong signature, or mismatched data all
    /// return `false`.
    pub fn verify_with_public_key_pem(pem: &str, data: &[u8], signature: &[u8]) -> bool {
        let public_key = match RsaPublicKey::from_public_key_pem(pem) {
            Ok(k) => k,
            Err(_) => return false,
        };
        let digest = Sha256::digest(data);
        public_key.verify(pss(), &digest, signature).is_ok()
    }
}

impl Signer for RsaLegacySigner {
    fn algorithm(&self) -> SigningAlgorithm {
        SigningAlgorithm::Rsa2048Pss
    }

    fn key_id(&self) -> AttestResult<String> {
        self.key_id
            .clone()
            .ok_or(AttestError::UninitializedSigner)
    }

    fn public_key_bytes(&self) -> AttestResult<Vec<u8>> {
        let public = self
            .public_key
            .as_ref()
            .ok_or(AttestError::UninitializedSigner)?;
        Self::spki_der(public)
    }

    fn sign(&self, data: &[u8]) -> AttestResult<Vec<u8>> {
        let private = self.private()?;
        let digest = Sha256::digest(data);
        private
            .sign_with_rng(&mut OsRng, pss(), &digest)
            .map_err(|e| AttestError::InvalidKey {
                reason: format!("RSA signing failed: {e}"),
            })
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let public = match self.public_key.as_ref() {
            Some(k) => k,
            None => return false,
        };
        let digest = Sha256::digest(data);
        public.verify(pss(), &digest, signature).is_ok()
    }

    fn generate_keypair(&mut self) -> AttestResult<()> {
        let private = RsaPrivateKey::new(&mut OsRng, 2048).map_err(|e| AttestError::InvalidKey {
            reason: format!("RSA key generation failed: {e}"),
        })?;
        let public = RsaPublicKey::from(&private);
        self.key_id = Some(compute_key_id(&Self::spki_der(&public)?));
        self.private_key = Some(private);
        self.public_key = Some(public);
        info!(key_id = %self.key_id.as_deref().unwrap_or(""), "generated new RSA-2048 keypair");
        Ok(())
    }

    fn load_keypair(&mut self, path: &Path) -> bool {
        let private_path = path.join(PRIVATE_KEY_FILE);
        if !private_path.is_file() {
            return false;
        }
        let private = match RsaPrivateKey::read_pkcs8_pem_file(&private_path) {
            Ok(k) => k,
            Err(e) => {
                debug!(path = %private_path.display(), error = %e, "could not load RSA private key");
                return false;
            }
        };
        let public = RsaPublicKey::from(&private);
        let key_id = match Self::spki_der(&public) {
            Ok(der) => compute_key_id(&der),
            Err(_) => return false,
        };
        self.private_key = Some(private);
        self.public_key = Some(public);
        self.key_id = Some(key_id);
        info!(
            path = %private_path.display(),
            key_id = %self.key_id.as_deref().unwrap_or(""),
            "loaded RSA keypair"
        );
        true
    }

    fn save_keypair(&self, path: &Path) -> AttestResult<()> {
        let private = self.private()?;
        std::fs::create_dir_all(path).map_err(|e| AttestError::Storage {
            op: "create key dir",
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let private_path = path.join(PRIVATE_KEY_FILE);
        private
            .write_pkcs8_pem_file(&private_path, rsa::pkcs8::LineEnding::LF)
            .map_err(|e| AttestError::Storage {
                op: "write private key",
                path: private_path.display().to_string(),
                reason: e.to_string(),
            })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&private_path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| AttestError::Storage {
                    op: "restrict private key permissions",
                    path: private_path.display().to_string(),
                    reason: e.to_string(),
                })?;
        }

        let public_path = path.join(PUBLIC_KEY_FILE);
        std::fs::write(&public_path, self.public_key_pem()?).map_err(|e| {
            AttestError::Storage {
                op: "write public key",
                path: public_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        info!(path = %path.display(), "saved RSA keypair");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
