//! # attest-migrate
//!
//! The one-shot key migration procedure: atomically re-sign an entire
//! historical chain under a new signing algorithm without losing chain
//! continuity.
//!
//! Migration is the only operation that rewrites history.  It must never
//! run concurrently with signing or verification — the deployment is
//! single-writer, and the migrator assumes exclusive access for its whole
//! run.

pub mod migration;

pub use migration::{KeyMigrator, MigrationConfig, MigrationResult, MigrationStep};
