//! Chain preview commands for CLI.

use anchorplan_core::anchor::AnchorSource;
use anchorplan_core::context::fetch_daily_context;
use anchorplan_core::plan::InMemoryPlanStore;
use anchorplan_core::{ChainStepInstance, Config, ExecutionChain, StaticAnchorSource, StaticContextProvider};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Arc;

use super::scenario::Scenario;
use super::CommandResult;

#[derive(Subcommand)]
pub enum ChainAction {
    /// Generate and print the preparation chains for a scenario's anchors
    Preview {
        /// Scenario JSON file
        scenario: PathBuf,
        /// Current location, used as travel origin
        #[arg(long)]
        location: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(action: ChainAction) -> CommandResult {
    match action {
        ChainAction::Preview {
            scenario,
            location,
            json,
        } => {
            let scenario = Scenario::load(&scenario)?;
            let config = Config::load_or_default();
            let builder = scenario.builder(&config, None, Arc::new(InMemoryPlanStore::new()))?;

            let anchors = StaticAnchorSource::new(scenario.anchors.clone())
                .anchors_for(scenario.input.date)
                .await?;
            let provider = StaticContextProvider::new(scenario.context.clone());
            let context = fetch_daily_context(
                &provider,
                &scenario.input.user_id,
                scenario.input.date,
                config.context.timeout(),
            )
            .await;
            let batch = builder
                .generate_chains(
                    &anchors,
                    scenario.location(location.as_deref()),
                    scenario.input.energy_state,
                    &context,
                )
                .await;

            if json {
                println!("{}", serde_json::to_string_pretty(&batch.chains)?);
            } else {
                for chain in &batch.chains {
                    print_chain(chain);
                }
            }
            for failure in &batch.failures {
                eprintln!("anchor {} omitted: {}", failure.anchor_id, failure.error);
            }
        }
    }
    Ok(())
}

fn hhmm(at: DateTime<Utc>) -> String {
    at.format("%H:%M").to_string()
}

fn step_line(step: &ChainStepInstance) -> String {
    let mut line = format!(
        "  {}-{}  {:<24} {:>3} min",
        hhmm(step.start_time),
        hhmm(step.end_time),
        step.name,
        step.duration_minutes
    );
    if step.fallback_used() || step.template_fallback() {
        line.push_str(" (estimated)");
    }
    line
}

fn print_chain(chain: &ExecutionChain) {
    println!(
        "{} [{}] {} {}-{}",
        chain.chain_id,
        chain.metadata.template_type,
        chain.anchor.title,
        hhmm(chain.anchor.start),
        hhmm(chain.anchor.end)
    );
    println!("  complete by {}", hhmm(chain.chain_completion_deadline));
    for step in &chain.steps {
        println!("{}", step_line(step));
        for suggestion in &step.metadata.exit_gate_suggestions {
            println!("      - {suggestion}");
        }
    }
    println!("  envelope:");
    for phase in chain.commitment_envelope.phases() {
        println!("{}", step_line(phase));
    }
    if let Some(info) = &chain.metadata.context {
        if info.context_available {
            println!("  risk multiplier: {:.2}", info.risk_multiplier);
        }
    }
}
