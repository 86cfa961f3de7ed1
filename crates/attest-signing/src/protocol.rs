//! The algorithm-agnostic signing contract.
//!
//! Every algorithm the ledger can sign or verify with implements
//! [`Signer`].  The set is deliberately closed — Ed25519 (current) and
//! RSA-2048-PSS (legacy) today, a post-quantum candidate later — and
//! dispatch is always by the algorithm tag stored with each key, never by
//! runtime type inspection.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use attest_contracts::{AttestResult, SigningAlgorithm};

/// Operations any signing algorithm must provide.
///
/// `sign`, `key_id`, and `public_key_bytes` fail with
/// [`attest_contracts::AttestError::UninitializedSigner`] before key
/// material exists.  `verify` is a pure predicate: malformed signatures,
/// wrong lengths, and mismatched data all return `false`, never an error.
pub trait Signer: Send + Sync {
    /// The algorithm tag for this signer.
    fn algorithm(&self) -> SigningAlgorithm;

    /// Derived key identifier (`agent-{hex12}` of `SHA-256(public_key_bytes)`).
    fn key_id(&self) -> AttestResult<String>;

    /// Raw public key bytes, for registration with external services.
    fn public_key_bytes(&self) -> AttestResult<Vec<u8>>;

    /// Standard-base64 public key, for API registration payloads.
    fn public_key_base64(&self) -> AttestResult<String> {
        Ok(STANDARD.encode(self.public_key_bytes()?))
    }

    /// Sign `data`, returning raw signature bytes.
    fn sign(&self, data: &[u8]) -> AttestResult<Vec<u8>>;

    /// Verify `signature` over `data`.  Never errors.
    fn verify(&self, data: &[u8], signature: &[u8]) -> bool;

    /// Generate a fresh keypair, replacing any held material.
    fn generate_keypair(&mut self) -> AttestResult<()>;

    /// Load key material from `path`.  Returns `false` (without erroring)
    /// when nothing loadable exists there — callers fall through to the
    /// next candidate location or to generation.
    fn load_keypair(&mut self, path: &Path) -> bool;

    /// Persist key material to `path` with restrictive permissions.
    fn save_keypair(&self, path: &Path) -> AttestResult<()>;
}

/// Compute the derived key identifier for a public key.
///
/// Format: `agent-{first 12 hex chars of SHA-256(public_key_bytes)}`.
/// This must match the identifier format used by external key registries.
pub fn compute_key_id(public_key_bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(public_key_bytes));
    format!("agent-{}", &digest[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_id_has_agent_prefix_and_twelve_hex_chars() {
        let key_id = compute_key_id(b"some public key bytes");
        assert!(key_id.starts_with("agent-"));
        let suffix = &key_id["agent-".len()..];
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn key_id_is_deterministic_per_key() {
        let a = compute_key_id(b"key-a");
        assert_eq!(a, compute_key_id(b"key-a"));
        assert_ne!(a, compute_key_id(b"key-b"));
    }
}
