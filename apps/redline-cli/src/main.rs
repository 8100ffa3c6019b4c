//! # redline-cli
//!
//! Operator command-line interface for the redline mediation gateway.
//!
//! - `redline submit <action.json>`: mediate one action end to end
//! - `redline policy check/show`: dry-run an action, print the rule set
//! - `redline pending list/approve/deny/execute/cancel`: the approval queue
//! - `redline quarantine list/show/get/reclaim`: inspect diverted payloads
//! - `redline audit verify/tail`: inspect the hash-chained audit log
//!
//! Everything lives under `<project>/.redline/`. Logs go to stderr so that
//! command output on stdout stays machine-readable.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use redline_mediation::GatewayConfig;
use tracing_subscriber::EnvFilter;

/// Redline: mediate, review and audit agent actions.
#[derive(Parser)]
#[command(name = "redline", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mediate an action described by a JSON file.
    Submit {
        /// Action file (see `redline policy check --help` for the format).
        file: PathBuf,
        /// Give up on the action after this many milliseconds.
        #[arg(long)]
        cancel_after_ms: Option<u64>,
        /// Context attribute visible to rules (repeatable).
        #[arg(long = "attr", value_parser = commands::parse_attribute)]
        attributes: Vec<(String, String)>,
    },
    /// Inspect and dry-run the policy.
    Policy {
        #[command(subcommand)]
        command: commands::policy::PolicyCommands,
    },
    /// Review actions awaiting approval.
    Pending {
        #[command(subcommand)]
        command: commands::pending::PendingCommands,
    },
    /// Inspect quarantined payloads.
    Quarantine {
        #[command(subcommand)]
        command: commands::quarantine::QuarantineCommands,
    },
    /// Inspect the audit trail.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("redline_mediation=info".parse()?)
        .add_directive("redline_cli=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = GatewayConfig::load(&project_root)?;

    match &cli.command {
        Commands::Submit {
            file,
            cancel_after_ms,
            attributes,
        } => commands::submit::execute(&config, file, *cancel_after_ms, attributes),
        Commands::Policy { command } => commands::policy::execute(command, &config),
        Commands::Pending { command } => commands::pending::execute(command, &config),
        Commands::Quarantine { command } => commands::quarantine::execute(command, &config),
        Commands::Audit { command } => commands::audit::execute(command, &config),
    }
}
