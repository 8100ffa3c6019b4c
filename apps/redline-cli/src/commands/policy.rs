// policy.rs — Policy subcommands: check (dry run with trace), show.

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use redline_mediation::GatewayConfig;
use redline_policy::{EvaluationContext, FileRuleStore, PolicyEngine, RuleSet, RuleStore};

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Evaluate an action file against the active rules without running it.
    Check {
        /// Action file (JSON with kind, payload, requested_by, tags, secrets).
        file: PathBuf,
        /// Evaluation-context attribute, as key=value. Repeatable.
        #[arg(long = "attr", value_parser = super::parse_attribute)]
        attributes: Vec<(String, String)>,
        /// Print the decision and trace as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the active rule set as YAML.
    Show,
}

pub fn execute(cmd: &PolicyCommands, config: &GatewayConfig) -> anyhow::Result<()> {
    match cmd {
        PolicyCommands::Check {
            file,
            attributes,
            json,
        } => check(config, file, attributes, *json),
        PolicyCommands::Show => {
            let ruleset = active_ruleset(config)?;
            print!("{}", serde_yaml::to_string(&ruleset)?);
            Ok(())
        }
    }
}

fn check(
    config: &GatewayConfig,
    file: &std::path::Path,
    attributes: &[(String, String)],
    json: bool,
) -> anyhow::Result<()> {
    let action = super::read_action(file)?;
    let ruleset = active_ruleset(config)?;
    let engine = PolicyEngine::new(&ruleset, config.settings.policy.engine_config())?;

    let mut context = EvaluationContext::now();
    for (key, value) in attributes {
        context = context.with_attribute(key, value);
    }
    let trace = engine.evaluate_with_trace(&action, &context)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&trace)?);
        return Ok(());
    }

    println!("Rule set:  {}", ruleset.version);
    println!("Action:    {} ({})", action.id(), action.kind());
    println!();
    println!("{:<36} {:<9} {:<17} {:<8} DECIDED", "RULE", "PRIORITY", "EFFECT", "MATCHED");
    println!("{}", "-".repeat(80));
    for step in &trace.steps {
        println!(
            "{:<36} {:<9} {:<17} {:<8} {}",
            super::truncate(&step.rule, 34),
            step.priority,
            format!("{:?}", step.effect),
            if step.matched { "yes" } else { "no" },
            if step.terminal { "<--" } else { "" },
        );
    }
    println!();
    println!("Verdict:   {}", trace.decision.verdict);
    println!("Reason:    {}", trace.decision.reason);
    Ok(())
}

fn active_ruleset(config: &GatewayConfig) -> anyhow::Result<RuleSet> {
    if config.rules_file.exists() {
        FileRuleStore::new(&config.rules_file)
            .load_active_ruleset()
            .with_context(|| format!("cannot load {}", config.rules_file.display()))
    } else {
        Ok(RuleSet::builtin())
    }
}
