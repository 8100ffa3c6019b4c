// pending.rs — Approval queue subcommands: list, view, approve, deny,
// execute, cancel.

use clap::Subcommand;
use redline_mediation::{GatewayConfig, MediationGateway, PendingStore};
use redline_policy::Verdict;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum PendingCommands {
    /// List pending actions.
    List {
        /// Include resolved, executed and cancelled entries.
        #[arg(long)]
        all: bool,
    },
    /// Show one pending action with its decisions.
    View {
        /// Pending handle.
        handle: Uuid,
    },
    /// Approve a pending action.
    Approve {
        /// Pending handle.
        handle: Uuid,
        /// Why it is safe to run.
        #[arg(long, default_value = "approved by operator")]
        reason: String,
        /// Operator name recorded on the decision.
        #[arg(long, default_value = "operator")]
        operator: String,
        /// Run it immediately after approving.
        #[arg(long)]
        execute: bool,
    },
    /// Deny a pending action.
    Deny {
        /// Pending handle.
        handle: Uuid,
        /// Reason for denial.
        #[arg(long)]
        reason: String,
        /// Operator name recorded on the decision.
        #[arg(long, default_value = "operator")]
        operator: String,
    },
    /// Run an approved action. Succeeds once per handle.
    Execute {
        /// Pending handle.
        handle: Uuid,
    },
    /// Withdraw a pending action by its action id.
    Cancel {
        /// Action id.
        action_id: Uuid,
    },
}

pub fn execute(cmd: &PendingCommands, config: &GatewayConfig) -> anyhow::Result<()> {
    match cmd {
        PendingCommands::List { all } => list(config, *all),
        PendingCommands::View { handle } => view(config, *handle),
        PendingCommands::Approve {
            handle,
            reason,
            operator,
            execute,
        } => {
            let gateway = MediationGateway::from_config(config)?;
            let rt = super::runtime()?;
            rt.block_on(async {
                let decision = gateway
                    .resolve_pending(*handle, Verdict::Allow, reason.as_str(), operator.as_str())
                    .await?;
                println!("Approved {} (action {}).", handle, decision.action_id);
                if *execute {
                    let outcome = gateway
                        .execute_approved(*handle, CancellationToken::new())
                        .await?;
                    super::submit::print_outcome(&outcome)?;
                }
                Ok::<(), anyhow::Error>(())
            })
        }
        PendingCommands::Deny {
            handle,
            reason,
            operator,
        } => {
            let gateway = MediationGateway::from_config(config)?;
            let rt = super::runtime()?;
            let decision = rt.block_on(gateway.resolve_pending(
                *handle,
                Verdict::Deny,
                reason.as_str(),
                operator.as_str(),
            ))?;
            println!("Denied {} (action {}): {}", handle, decision.action_id, decision.reason);
            Ok(())
        }
        PendingCommands::Execute { handle } => {
            let gateway = MediationGateway::from_config(config)?;
            let rt = super::runtime()?;
            let outcome = rt.block_on(gateway.execute_approved(*handle, CancellationToken::new()))?;
            super::submit::print_outcome(&outcome)
        }
        PendingCommands::Cancel { action_id } => {
            let gateway = MediationGateway::from_config(config)?;
            let rt = super::runtime()?;
            let outcome = rt.block_on(gateway.cancel(*action_id))?;
            println!("{action_id}: {}", serde_json::to_string(&outcome)?);
            Ok(())
        }
    }
}

fn list(config: &GatewayConfig, all: bool) -> anyhow::Result<()> {
    let store = PendingStore::open(&config.pending_dir)?;
    let entries: Vec<_> = store
        .list()?
        .into_iter()
        .filter(|p| all || !p.state.is_terminal())
        .collect();

    if entries.is_empty() {
        println!("No pending actions.");
        return Ok(());
    }

    println!(
        "{:<38} {:<10} {:<14} {:<20} REASON",
        "HANDLE", "STATE", "KIND", "CREATED"
    );
    println!("{}", "-".repeat(120));
    for p in &entries {
        println!(
            "{:<38} {:<10} {:<14} {:<20} {}",
            p.handle,
            p.state,
            p.action.kind(),
            p.created_at.format("%Y-%m-%d %H:%M:%S"),
            super::truncate(&p.decision.reason, 48),
        );
    }
    println!("\n{} pending action(s).", entries.len());
    Ok(())
}

fn view(config: &GatewayConfig, handle: Uuid) -> anyhow::Result<()> {
    let store = PendingStore::open(&config.pending_dir)?;
    let p = store.load(handle)?;

    println!("Handle:        {}", p.handle);
    println!("State:         {}", p.state);
    println!("Action:        {} ({})", p.action.id(), p.action.kind());
    println!("Requested by:  {}", p.action.requested_by());
    println!("Payload:       {}", p.action.payload_text());
    if !p.action.secret_refs().is_empty() {
        let names: Vec<String> = p.action.secret_refs().iter().map(|s| s.to_string()).collect();
        println!("Secrets:       {}", names.join(", "));
    }
    println!();
    println!("Policy decision:");
    println!("  Rules:       {}", p.decision.rule_names().join(", "));
    println!("  Reason:      {}", p.decision.reason);
    if let Some(resolution) = &p.resolution {
        println!("Operator decision:");
        println!("  Verdict:     {}", resolution.verdict);
        println!("  Reason:      {}", resolution.reason);
        println!("  At:          {}", resolution.evaluated_at.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}
