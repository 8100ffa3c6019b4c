// audit.rs — Audit subcommands: verify, tail.

use std::path::PathBuf;

use clap::Subcommand;
use redline_audit::{hasher, AuditError, AuditLog};
use redline_mediation::GatewayConfig;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the audit log hash chain and sequence numbering.
    Verify {
        /// Path to audit log (defaults to .redline/audit.jsonl).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Show recent audit entries.
    Tail {
        /// Path to audit log (defaults to .redline/audit.jsonl).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of entries to show.
        #[arg(short, default_value = "10")]
        n: usize,
        /// Print full entries as JSON lines.
        #[arg(long)]
        json: bool,
    },
}

pub fn execute(cmd: &AuditCommands, config: &GatewayConfig) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::Verify { log } => {
            let path = log.clone().unwrap_or_else(|| config.audit_log.clone());
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            match AuditLog::verify_chain(&path) {
                Ok(count) => {
                    println!("Audit log verified: {count} entr(ies), hash chain intact.");
                }
                Err(AuditError::IntegrityViolation {
                    line,
                    expected,
                    actual,
                }) => {
                    println!("INTEGRITY VIOLATION at line {line}:");
                    println!("  Expected previous_hash: {expected}");
                    println!("  Actual previous_hash:   {actual}");
                    println!();
                    println!("The audit log may have been tampered with.");
                    anyhow::bail!("Audit log integrity check failed");
                }
                Err(e @ AuditError::SequenceGap { .. }) => {
                    println!("SEQUENCE GAP: {e}");
                    anyhow::bail!("Audit log integrity check failed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        AuditCommands::Tail { log, n, json } => {
            let path = log.clone().unwrap_or_else(|| config.audit_log.clone());
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            let recent = AuditLog::tail(&path, *n)?;
            if recent.is_empty() {
                println!("No audit entries.");
                return Ok(());
            }

            if *json {
                for entry in &recent {
                    println!("{}", serde_json::to_string(entry)?);
                }
                return Ok(());
            }

            println!(
                "{:<6} {:<20} {:<14} {:<16} {:<18} {:<13} ACTION",
                "SEQ", "TIMESTAMP", "KIND", "VERDICT", "OUTCOME", "PAYLOAD"
            );
            println!("{}", "-".repeat(132));
            for entry in &recent {
                println!(
                    "{:<6} {:<20} {:<14} {:<16} {:<18} {:<13} {}",
                    entry.seq,
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.kind,
                    entry
                        .verdict()
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    entry.outcome.label(),
                    entry.payload_hash.as_deref().map(hasher::short).unwrap_or("-"),
                    entry.action_id,
                );
            }
        }
    }

    Ok(())
}
