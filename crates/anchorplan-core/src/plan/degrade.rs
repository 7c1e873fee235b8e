//! Plan degradation: shed optional tasks when the day runs behind.
//!
//! Skipped task blocks stay in the plan as tombstones so their history is
//! kept; only pending filler buffers are removed and re-derived.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::block::{BlockSource, TimeBlock};
use super::builder::filler_blocks;
use super::timeline::Interval;
use super::{ActivityType, DailyPlan, LocationState, PlanStatus};
use crate::error::PlanError;
use crate::status::ExecutionStatus;

pub const DEGRADED_SKIP_REASON: &str = "degraded";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradeSummary {
    /// Block ids of the tasks that were skipped.
    pub skipped_tasks: Vec<String>,
    pub removed_buffers: usize,
    pub added_buffers: usize,
}

/// Degrade `plan` in place. On error `plan` is left untouched.
///
/// # Errors
/// Returns [`PlanError::AlreadyDegraded`] if the plan was degraded before,
/// or a validation error if the result breaks a block invariant.
pub fn degrade_plan(plan: &mut DailyPlan) -> Result<DegradeSummary, PlanError> {
    if plan.status == PlanStatus::Degraded {
        return Err(PlanError::AlreadyDegraded {
            plan_id: plan.id.clone(),
        });
    }

    let mut staged = plan.clone();
    let summary = degrade_staged(&mut staged)?;
    *plan = staged;
    Ok(summary)
}

fn degrade_staged(plan: &mut DailyPlan) -> Result<DegradeSummary, PlanError> {
    let mut summary = DegradeSummary::default();
    for block in &plan.time_blocks {
        if block.activity_type == ActivityType::Task && !block.is_required && block.is_pending() {
            block.state.transition(
                &block.id,
                ExecutionStatus::Skipped,
                Some(DEGRADED_SKIP_REASON.to_string()),
            )?;
            summary.skipped_tasks.push(block.id.clone());
        }
    }

    let before = plan.time_blocks.len();
    plan.time_blocks
        .retain(|b| !(b.metadata.source == BlockSource::Filler && b.is_pending()));
    summary.removed_buffers = before - plan.time_blocks.len();

    if let Some(day) = Interval::new(plan.plan_start, plan.sleep_time) {
        let occupied: Vec<Interval> = plan.active_blocks().map(TimeBlock::interval).collect();
        let not_home: Vec<Interval> = plan
            .time_blocks
            .iter()
            .filter(|b| b.metadata.location_state == LocationState::NotHome)
            .map(TimeBlock::interval)
            .collect();
        let mut ids: HashSet<String> = plan.time_blocks.iter().map(|b| b.id.clone()).collect();

        for mut filler in filler_blocks(&plan.id, &occupied, day, &not_home) {
            if ids.contains(&filler.id) {
                filler.id = format!("{}-{}", filler.id, DEGRADED_SKIP_REASON);
            }
            ids.insert(filler.id.clone());
            plan.time_blocks.push(filler);
            summary.added_buffers += 1;
        }
    }

    plan.status = PlanStatus::Degraded;
    plan.resequence();
    plan.validate()?;

    tracing::info!(
        plan_id = %plan.id,
        skipped = summary.skipped_tasks.len(),
        removed_buffers = summary.removed_buffers,
        added_buffers = summary.added_buffers,
        "plan degraded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::block::BlockMetadata;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, 0).unwrap()
    }

    fn block(id: &str, from: (u32, u32), to: (u32, u32), kind: ActivityType, source: BlockSource) -> TimeBlock {
        TimeBlock::new(
            id,
            "p1",
            Interval::new(at(from.0, from.1), at(to.0, to.1)).unwrap(),
            kind,
            id,
            BlockMetadata::new(source, LocationState::AtHome),
        )
    }

    fn plan() -> DailyPlan {
        let mut plan = DailyPlan {
            id: "p1".into(),
            user_id: "u1".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            wake_time: at(8, 0),
            sleep_time: at(12, 0),
            plan_start: at(8, 0),
            energy_state: Default::default(),
            status: PlanStatus::Pending,
            time_blocks: vec![
                block("meeting", (8, 0), (9, 0), ActivityType::Commitment, BlockSource::Chain).with_flags(true, true),
                block("task-a", (9, 0), (10, 0), ActivityType::Task, BlockSource::Task),
                block("task-b", (10, 0), (11, 0), ActivityType::Task, BlockSource::Task).with_flags(false, true),
                block("buffer", (11, 0), (12, 0), ActivityType::Buffer, BlockSource::Filler),
            ],
        };
        plan.resequence();
        plan
    }

    #[test]
    fn skips_optional_tasks_and_refills_buffers() {
        let mut plan = plan();
        let summary = degrade_plan(&mut plan).unwrap();

        assert_eq!(plan.status, PlanStatus::Degraded);
        assert_eq!(summary.skipped_tasks, vec!["task-a".to_string()]);
        let task_a = plan.block("task-a").unwrap();
        assert_eq!(task_a.status(), ExecutionStatus::Skipped);
        assert_eq!(task_a.skip_reason(), Some(DEGRADED_SKIP_REASON));
        assert!(plan.block("task-b").unwrap().is_pending());
        assert!(plan.block("meeting").unwrap().is_pending());

        let buffers: Vec<_> = plan
            .active_blocks()
            .filter(|b| b.metadata.source == BlockSource::Filler)
            .map(|b| (b.start_time, b.end_time))
            .collect();
        assert_eq!(buffers, vec![(at(9, 0), at(10, 0)), (at(11, 0), at(12, 0))]);
        assert_eq!(summary.removed_buffers, 1);
        assert_eq!(summary.added_buffers, 2);
        plan.validate().unwrap();
    }

    #[test]
    fn terminal_blocks_are_left_alone() {
        let mut plan = plan();
        let task_a = plan.block("task-a").unwrap();
        task_a.state.transition(&task_a.id, ExecutionStatus::Completed, None).unwrap();

        let summary = degrade_plan(&mut plan).unwrap();
        assert!(summary.skipped_tasks.is_empty());
        assert_eq!(plan.block("task-a").unwrap().status(), ExecutionStatus::Completed);
    }

    #[test]
    fn second_degrade_is_rejected() {
        let mut plan = plan();
        degrade_plan(&mut plan).unwrap();
        let err = degrade_plan(&mut plan).unwrap_err();
        assert!(matches!(err, PlanError::AlreadyDegraded { .. }));
        assert!(err.to_string().contains("already degraded"));
    }

    #[test]
    fn failed_degrade_leaves_plan_untouched() {
        let mut plan = plan();
        plan.time_blocks.push(
            block("clash", (8, 30), (9, 30), ActivityType::Commitment, BlockSource::Chain).with_flags(true, true),
        );
        plan.resequence();

        let err = degrade_plan(&mut plan).unwrap_err();
        assert!(matches!(err, PlanError::Validation(_)));
        assert_eq!(plan.status, PlanStatus::Pending);
        assert!(plan.block("task-a").unwrap().is_pending());
        assert!(plan.block("buffer").is_some());
    }

    #[test]
    fn sequence_stays_strictly_increasing() {
        let mut plan = plan();
        degrade_plan(&mut plan).unwrap();
        let orders: Vec<u32> = plan.time_blocks.iter().map(|b| b.sequence_order).collect();
        assert!(orders.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(orders.first(), Some(&1));
    }
}
