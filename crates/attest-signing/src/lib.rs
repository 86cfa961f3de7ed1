//! # attest-signing
//!
//! The signing protocol for the ATTEST audit ledger: the algorithm-agnostic
//! [`Signer`] contract, the Ed25519 and legacy RSA-2048-PSS implementations,
//! the process-wide [`UnifiedSigningKey`], and the [`SignatureManager`] that
//! binds keys to audit entries.
//!
//! The algorithm set is closed and dispatch is always by the algorithm tag
//! stored with each key in the registry — adding a post-quantum scheme means
//! a new [`Signer`] implementation plus one new
//! [`attest_contracts::SigningAlgorithm`] variant, nothing else.

pub mod ed25519;
pub mod manager;
pub mod protocol;
pub mod rsa_legacy;
pub mod unified;

pub use ed25519::Ed25519Signer;
pub use manager::SignatureManager;
pub use protocol::{compute_key_id, Signer};
pub use rsa_legacy::RsaLegacySigner;
pub use unified::UnifiedSigningKey;
