//! ATTEST — operator CLI for the tamper-evident audit ledger.
//!
//! Usage:
//!   attest verify                        # full-chain verification
//!   attest verify-range --start 1 --end 100
//!   attest verify-entry 42
//!   attest tamper-scan
//!   attest anchors
//!   attest report
//!   attest append --event-type tool_call --data '{"tool":"search"}'
//!   attest key-info
//!   attest registration --description "audit agent"
//!   attest revoke-key agent-0123456789ab
//!   attest migrate
//!
//! All subcommands print a JSON result to stdout; diagnostics go to stderr
//! via `tracing` (set RUST_LOG=debug for verbose output).

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use attest_chain::AuditLedger;
use attest_contracts::{AttestResult, AuditEvent};
use attest_migrate::{KeyMigrator, MigrationConfig};
use attest_signing::{SignatureManager, UnifiedSigningKey};
use attest_store::AuditStore;
use attest_verify::AuditVerifier;

use config::Config;

// ── CLI definition ────────────────────────────────────────────────────────────

/// ATTEST: append-only, tamper-evident audit ledger.
#[derive(Parser)]
#[command(
    name = "attest",
    about = "Tamper-evident audit ledger operator tool",
    long_about = "Verifies, audits, and migrates the hash-chained, signed audit ledger.\n\
                  Every recorded event is chained to its predecessor and individually\n\
                  signed, so any retroactive edit is cryptographically detectable."
)]
struct Cli {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify the complete chain: hashes, links, and signatures.
    Verify,
    /// Verify a bounded sub-range of the chain.
    VerifyRange {
        #[arg(long)]
        start: u64,
        #[arg(long)]
        end: u64,
    },
    /// Verify a single entry by sequence number.
    VerifyEntry { sequence: u64 },
    /// Locate the first entry whose stored hash does not match.
    TamperScan,
    /// Validate the stored root anchors against the chain.
    Anchors,
    /// Produce the full verification report with recommendations.
    Report,
    /// Append one event to the ledger (collaborator entry point).
    Append {
        #[arg(long)]
        event_type: String,
        /// Opaque serialized event payload.
        #[arg(long)]
        data: String,
        /// ISO-8601 timestamp; the current time is used when omitted.
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Show the active signing key's metadata.
    KeyInfo,
    /// Produce the external key-registration payload.
    Registration {
        #[arg(long, default_value = "audit signing key")]
        description: String,
    },
    /// Revoke a registry key (its public material is retained).
    RevokeKey { key_id: String },
    /// Migrate the whole chain to Ed25519 signatures (one-shot, exclusive).
    Migrate,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("attest: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    match run(cli.command, &config) {
        Ok(clean) => {
            if clean {
                ExitCode::SUCCESS
            } else {
                // Verification found problems: described on stdout, signaled
                // via the exit code for scripting.
                ExitCode::from(2)
            }
        }
        Err(e) => {
            eprintln!("attest: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatch one subcommand.  Returns whether the outcome was "clean"
/// (valid chain / successful operation).
fn run(command: Command, config: &Config) -> AttestResult<bool> {
    match command {
        Command::Verify => {
            let (store, manager) = open_components(config)?;
            let result = AuditVerifier::new(store, manager).verify_complete_chain()?;
            print_json(&result);
            Ok(result.valid)
        }
        Command::VerifyRange { start, end } => {
            let (store, manager) = open_components(config)?;
            let result = AuditVerifier::new(store, manager).verify_range(start, end)?;
            print_json(&result);
            Ok(result.valid)
        }
        Command::VerifyEntry { sequence } => {
            let (store, manager) = open_components(config)?;
            let result = AuditVerifier::new(store, manager).verify_entry(sequence)?;
            print_json(&result);
            Ok(result.valid)
        }
        Command::TamperScan => {
            let (store, manager) = open_components(config)?;
            let found = AuditVerifier::new(store, manager).find_tampering_fast()?;
            print_json(&serde_json::json!({
                "tampering_detected": found.is_some(),
                "first_tampered_sequence": found,
            }));
            Ok(found.is_none())
        }
        Command::Anchors => {
            let (store, manager) = open_components(config)?;
            let result = AuditVerifier::new(store, manager).verify_root_anchors()?;
            print_json(&result);
            Ok(result.valid)
        }
        Command::Report => {
            let (store, manager) = open_components(config)?;
            let report = AuditVerifier::new(store, manager).get_verification_report()?;
            print_json(&report);
            Ok(!report.tampering_detected)
        }
        Command::Append {
            event_type,
            data,
            timestamp,
        } => {
            let (store, manager) = open_components(config)?;
            let ledger = AuditLedger::new(store, manager, config.ledger.anchor_interval)?;
            let receipt = ledger.append(&AuditEvent {
                event_type,
                event_data: data,
                timestamp: timestamp.unwrap_or_else(|| Utc::now().to_rfc3339()),
            })?;
            print_json(&receipt);
            Ok(true)
        }
        Command::KeyInfo => {
            let (_store, manager) = open_components(config)?;
            print_json(&manager.key_info()?);
            Ok(true)
        }
        Command::Registration { description } => {
            let (_store, manager) = open_components(config)?;
            print_json(&manager.signing_key().registration_payload(&description)?);
            Ok(true)
        }
        Command::RevokeKey { key_id } => {
            let (_store, manager) = open_components(config)?;
            let revoked = manager.revoke_key(&key_id)?;
            print_json(&serde_json::json!({ "key_id": key_id, "revoked": revoked }));
            Ok(revoked)
        }
        Command::Migrate => {
            let result = KeyMigrator::new(MigrationConfig {
                db_path: config.storage.db_path.clone(),
                key_dir: config.signing.key_dir.clone(),
                backup_root: config.storage.backup_dir.clone(),
            })
            .migrate_to_ed25519()?;
            print_json(&result);
            Ok(result.success)
        }
    }
}

/// Open the store and an initialized signature manager per the config.
fn open_components(config: &Config) -> AttestResult<(Arc<AuditStore>, Arc<SignatureManager>)> {
    if let Some(parent) = config.storage.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| attest_contracts::AttestError::Storage {
                op: "create data dir",
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }
    }
    let store = Arc::new(AuditStore::open(&config.storage.db_path)?);
    let key = Arc::new(UnifiedSigningKey::with_key_path(Some(config.key_path())));
    let manager = Arc::new(SignatureManager::new(key, Arc::clone(&store)));
    manager.initialize()?;
    Ok((store, manager))
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("attest: could not serialize output: {e}"),
    }
}
