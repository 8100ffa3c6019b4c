// submit.rs — Mediate one action file end to end and print the outcome.

use std::path::Path;
use std::time::Duration;

use redline_mediation::{GatewayConfig, MediationGateway, SubmitOutcome};
use tokio_util::sync::CancellationToken;

pub fn execute(
    config: &GatewayConfig,
    file: &Path,
    cancel_after_ms: Option<u64>,
    attributes: &[(String, String)],
) -> anyhow::Result<()> {
    let action = super::read_action(file)?;
    let mut gateway = MediationGateway::from_config(config)?;
    for (key, value) in attributes {
        gateway = gateway.with_context_attribute(key.as_str(), value.as_str());
    }

    let rt = super::runtime()?;
    let outcome = rt.block_on(async {
        let cancel = CancellationToken::new();
        if let Some(ms) = cancel_after_ms {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                token.cancel();
            });
        }
        gateway.submit_with_cancel(action, cancel).await
    })?;

    print_outcome(&outcome)
}

pub fn print_outcome(outcome: &SubmitOutcome) -> anyhow::Result<()> {
    match outcome {
        SubmitOutcome::Allowed(result) => {
            eprintln!(
                "allowed: exit {:?} in {} ms ({} attempt(s))",
                result.exit_status,
                result.duration.as_millis(),
                result.resource_usage.attempts
            );
        }
        SubmitOutcome::Denied(rejection) => eprintln!("denied: {}", rejection.reason),
        SubmitOutcome::Quarantined(receipt) => eprintln!(
            "quarantined: {} (expires {})",
            receipt.content_hash,
            receipt.expires_at.format("%Y-%m-%d %H:%M:%S")
        ),
        SubmitOutcome::Pending(pending) => eprintln!(
            "pending approval: handle {} (redline pending approve {})",
            pending.handle, pending.handle
        ),
    }
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}
