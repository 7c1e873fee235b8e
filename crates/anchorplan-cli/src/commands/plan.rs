//! Daily plan commands for CLI.

use anchorplan_core::plan::{GeneratedPlan, InMemoryPlanStore, OmittedMeal};
use anchorplan_core::{DailyPlan, DegradeSummary, ExecutionStatus, TimeBlock};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use super::scenario::Scenario;
use super::CommandResult;

#[derive(Subcommand)]
pub enum PlanAction {
    /// Build the daily plan for a scenario file
    Build {
        /// Scenario JSON file
        scenario: PathBuf,
        /// Current time (RFC 3339), overrides the scenario clock
        #[arg(long)]
        now: Option<DateTime<Utc>>,
        /// Current location, used as travel origin
        #[arg(long)]
        location: Option<String>,
        /// Degrade the plan after building it
        #[arg(long)]
        degrade: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedAnchor {
    anchor_id: String,
    error: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildReport<'a> {
    plan: &'a DailyPlan,
    context_available: bool,
    failed_anchors: Vec<FailedAnchor>,
    unscheduled_tasks: &'a [String],
    omitted_meals: &'a [OmittedMeal],
    #[serde(skip_serializing_if = "Option::is_none")]
    degrade: Option<&'a DegradeSummary>,
}

pub async fn run(action: PlanAction) -> CommandResult {
    match action {
        PlanAction::Build {
            scenario,
            now,
            location,
            degrade,
            json,
        } => {
            let scenario = Scenario::load(&scenario)?;
            let config = anchorplan_core::Config::load_or_default();
            let builder = scenario.builder(&config, now, Arc::new(InMemoryPlanStore::new()))?;

            let generated = builder
                .generate_daily_plan(&scenario.input, scenario.location(location.as_deref()))
                .await?;
            let (plan, summary) = if degrade {
                let (plan, summary) = builder.degrade_plan(&generated.plan.id)?;
                (plan, Some(summary))
            } else {
                (generated.plan.clone(), None)
            };

            if json {
                let report = report(&generated, &plan, summary.as_ref());
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_table(&generated, &plan, summary.as_ref());
            }
        }
    }
    Ok(())
}

fn report<'a>(
    generated: &'a GeneratedPlan,
    plan: &'a DailyPlan,
    degrade: Option<&'a DegradeSummary>,
) -> BuildReport<'a> {
    BuildReport {
        plan,
        context_available: generated.context_available,
        failed_anchors: generated
            .failures
            .iter()
            .map(|f| FailedAnchor {
                anchor_id: f.anchor_id.clone(),
                error: f.error.to_string(),
            })
            .collect(),
        unscheduled_tasks: &generated.unscheduled_tasks,
        omitted_meals: &generated.omitted_meals,
        degrade,
    }
}

fn block_line(block: &TimeBlock) -> String {
    let mut name = block.activity_name.clone();
    if block.is_estimated() {
        name.push_str(" (estimated)");
    }
    let status = match block.status() {
        ExecutionStatus::Pending => String::new(),
        ExecutionStatus::Completed => " [completed]".to_string(),
        ExecutionStatus::Skipped => format!(" [skipped: {}]", block.skip_reason().unwrap_or("-")),
    };
    format!(
        "{:>3}  {}-{}  {:<10}  {}{}{}",
        block.sequence_order,
        block.start_time.format("%H:%M"),
        block.end_time.format("%H:%M"),
        block.activity_type,
        if block.is_fixed { "* " } else { "  " },
        name,
        status
    )
}

fn print_table(generated: &GeneratedPlan, plan: &DailyPlan, degrade: Option<&DegradeSummary>) {
    println!(
        "Plan {} for {} ({} blocks{})",
        plan.id,
        plan.date,
        plan.time_blocks.len(),
        if plan.is_degraded() { ", degraded" } else { "" }
    );
    if !generated.context_available {
        println!("Daily context unavailable, chains not enhanced");
    }
    for block in &plan.time_blocks {
        println!("{}", block_line(block));
    }
    for failure in &generated.failures {
        println!("Anchor {} omitted: {}", failure.anchor_id, failure.error);
    }
    for task in &generated.unscheduled_tasks {
        println!("Task {task} did not fit");
    }
    for meal in &generated.omitted_meals {
        println!("{} omitted: {:?}", meal.name, meal.reason);
    }
    if let Some(summary) = degrade {
        println!(
            "Degraded: {} tasks skipped, {} buffers replaced by {}",
            summary.skipped_tasks.len(),
            summary.removed_buffers,
            summary.added_buffers
        );
    }
}
