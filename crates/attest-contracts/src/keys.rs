//! Signing key registry types.

use serde::{Deserialize, Serialize};

/// The closed set of signing algorithms the ledger understands.
///
/// Dispatch is always by this tag as stored with each key — never by
/// runtime type inspection.  New algorithms (post-quantum candidates) are
/// added here and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningAlgorithm {
    /// Current default: Ed25519 (64-byte deterministic signatures).
    Ed25519,
    /// Legacy RSA-2048 with PSS padding.  Verification only for new chains;
    /// signing retained so migration fixtures can be produced.
    #[serde(rename = "rsa_2048_pss")]
    Rsa2048Pss,
}

impl SigningAlgorithm {
    /// The wire/database tag for this algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::Rsa2048Pss => "rsa_2048_pss",
        }
    }

    /// Parse a stored tag.  Unknown tags return `None` — for verification
    /// paths an unknown algorithm is a verification failure, not an error.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "ed25519" => Some(Self::Ed25519),
            "rsa_2048_pss" => Some(Self::Rsa2048Pss),
            _ => None,
        }
    }

    /// Nominal key size in bits.
    pub fn key_size_bits(&self) -> u32 {
        match self {
            Self::Ed25519 => 256,
            Self::Rsa2048Pss => 2048,
        }
    }
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row in the signing-key registry.
///
/// Keys are never deleted: a revoked key keeps its public material so that
/// historical signatures remain verifiable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKeyRecord {
    /// Derived identifier: `agent-{first 12 hex chars of SHA-256(public_key_bytes)}`.
    pub key_id: String,

    /// Public key material — base64 raw bytes for Ed25519, PEM for RSA.
    pub public_key: String,

    /// Algorithm tag, as stored.  Kept as text so rows written by a newer
    /// deployment with an unknown algorithm still load.
    pub algorithm: String,

    /// Key size in bits.
    pub key_size: u32,

    /// ISO-8601 creation time.
    pub created_at: String,

    /// ISO-8601 revocation time, or `None` while the key is active.  A
    /// migration marker embedded in the value means "superseded, retained
    /// for historical verification" rather than "compromised".
    pub revoked_at: Option<String>,
}

impl SigningKeyRecord {
    /// True while the key may sign new entries.
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// Payload for registering the active public key with an external registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub key_id: String,
    pub public_key_base64: String,
    pub algorithm: String,
    pub description: String,
}
