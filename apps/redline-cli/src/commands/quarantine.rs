// quarantine.rs — Quarantine subcommands: list, show, get, reclaim.

use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;
use redline_mediation::{GatewayConfig, MediationGateway};
use redline_quarantine::QuarantineStore;
use tokio_util::sync::CancellationToken;

#[derive(Subcommand)]
pub enum QuarantineCommands {
    /// List quarantine records.
    List,
    /// Show the record for a content hash.
    Show {
        /// SHA-256 content hash.
        hash: String,
    },
    /// Retrieve a quarantined payload. Writes to stdout unless --out is set.
    Get {
        /// SHA-256 content hash.
        hash: String,
        /// Write the payload to this file.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete records past their retention window.
    Reclaim {
        /// Keep running and reclaim on the configured interval until Ctrl-C.
        #[arg(long)]
        watch: bool,
    },
}

pub fn execute(cmd: &QuarantineCommands, config: &GatewayConfig) -> anyhow::Result<()> {
    if let QuarantineCommands::Reclaim { watch: true } = cmd {
        return watch(config);
    }

    let store = QuarantineStore::open(&config.quarantine_dir, config.retention())?;

    match cmd {
        QuarantineCommands::List => {
            let records = store.list()?;
            if records.is_empty() {
                println!("Quarantine is empty.");
                return Ok(());
            }
            println!(
                "{:<66} {:<6} {:<10} {:<20} EXPIRES",
                "CONTENT HASH", "REFS", "BYTES", "STORED"
            );
            println!("{}", "-".repeat(124));
            for r in &records {
                println!(
                    "{:<66} {:<6} {:<10} {:<20} {}",
                    r.content_hash,
                    r.reference_count,
                    r.size_bytes,
                    r.stored_at.format("%Y-%m-%d %H:%M:%S"),
                    r.expires_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
            println!("\n{} record(s).", records.len());
        }

        QuarantineCommands::Show { hash } => {
            let record = store.record(hash)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        QuarantineCommands::Get { hash, out } => {
            let bytes = store.get(hash)?;
            match out {
                Some(path) => {
                    std::fs::write(path, &bytes)?;
                    eprintln!("Wrote {} byte(s) to {}", bytes.len(), path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&bytes)?;
                }
            }
        }

        QuarantineCommands::Reclaim { .. } => {
            let reclaimed = store.reclaim_expired(Utc::now())?;
            for hash in &reclaimed {
                println!("reclaimed {hash}");
            }
            println!("{} record(s) reclaimed.", reclaimed.len());
        }
    }

    Ok(())
}

fn watch(config: &GatewayConfig) -> anyhow::Result<()> {
    let gateway = MediationGateway::from_config(config)?;
    let interval = config.reclaim_interval();
    let rt = super::runtime()?;
    rt.block_on(async {
        let cancel = CancellationToken::new();
        let reclaimer = gateway.spawn_reclaimer(interval, cancel.clone());
        eprintln!("Reclaiming every {}s; Ctrl-C to stop.", interval.as_secs());
        tokio::signal::ctrl_c().await?;
        cancel.cancel();
        reclaimer.await?;
        Ok::<(), anyhow::Error>(())
    })
}
