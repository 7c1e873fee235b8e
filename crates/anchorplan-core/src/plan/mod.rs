//! Daily plan assembly and degradation.
//!
//! A [`DailyPlan`] is the ordered list of [`TimeBlock`]s for one user and
//! one day. The [`PlanBuilder`] fills it from the day's chains, meals,
//! routines and tasks; [`degrade_plan`] sheds optional work when the day
//! runs behind.

pub mod block;
pub mod builder;
pub mod degrade;
pub mod meals;
pub mod store;
pub mod timeline;

pub use block::{BlockMetadata, BlockSource, BlockStatusCell, TimeBlock};
pub use builder::{
    AnchorFailure, ChainBatch, Collaborators, GeneratedPlan, OmittedMeal, PlanBuilder,
    PlannerSettings, RoutineTemplate,
};
pub use degrade::{degrade_plan, DegradeSummary, DEGRADED_SKIP_REASON};
pub use meals::{MealOmission, MealWindow};
pub use store::{InMemoryPlanStore, PlanStore};
pub use timeline::{Interval, Occupancy, TimeGapDetector};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnergyState {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Commitment,
    Routine,
    Meal,
    Task,
    Buffer,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commitment => "commitment",
            Self::Routine => "routine",
            Self::Meal => "meal",
            Self::Task => "task",
            Self::Buffer => "buffer",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LocationState {
    #[default]
    AtHome,
    NotHome,
}

/// Plan lifecycle. `Pending -> Degraded` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    #[default]
    Pending,
    Degraded,
}

/// Flexible work the user wants done today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTask {
    pub id: String,
    pub title: String,
    pub duration_minutes: i64,
    /// Higher first. Unset counts as 50.
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub is_required: bool,
}

impl PlannedTask {
    pub const DEFAULT_PRIORITY: i32 = 50;

    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or(Self::DEFAULT_PRIORITY)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInput {
    pub user_id: String,
    pub date: NaiveDate,
    pub wake_time: DateTime<Utc>,
    pub sleep_time: DateTime<Utc>,
    #[serde(default)]
    pub energy_state: EnergyState,
    #[serde(default)]
    pub tasks: Vec<PlannedTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPlan {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub wake_time: DateTime<Utc>,
    pub sleep_time: DateTime<Utc>,
    /// `max(wake_time, now)` at generation.
    pub plan_start: DateTime<Utc>,
    pub energy_state: EnergyState,
    #[serde(default)]
    pub status: PlanStatus,
    pub time_blocks: Vec<TimeBlock>,
}

impl DailyPlan {
    pub fn is_degraded(&self) -> bool {
        self.status == PlanStatus::Degraded
    }

    pub fn block(&self, block_id: &str) -> Option<&TimeBlock> {
        self.time_blocks.iter().find(|b| b.id == block_id)
    }

    /// Blocks that still occupy time (everything not skipped).
    pub fn active_blocks(&self) -> impl Iterator<Item = &TimeBlock> {
        self.time_blocks.iter().filter(|b| b.occupies_time())
    }

    /// Sort by start and renumber `sequence_order` from 1.
    pub(crate) fn resequence(&mut self) {
        self.time_blocks
            .sort_by(|a, b| (a.start_time, a.end_time, &a.id).cmp(&(b.start_time, b.end_time, &b.id)));
        for (i, block) in self.time_blocks.iter_mut().enumerate() {
            block.sequence_order = i as u32 + 1;
        }
    }

    /// Check the block invariants: valid ranges, strictly increasing
    /// sequence order, no overlap between active blocks.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for block in &self.time_blocks {
            if block.end_time <= block.start_time {
                return Err(ValidationError::InvalidTimeRange {
                    start: block.start_time,
                    end: block.end_time,
                });
            }
        }

        for pair in self.time_blocks.windows(2) {
            if pair[1].sequence_order <= pair[0].sequence_order {
                return Err(ValidationError::NonMonotonicSequence {
                    block: pair[1].id.clone(),
                    previous: pair[0].sequence_order,
                    current: pair[1].sequence_order,
                });
            }
        }

        let mut active: Vec<&TimeBlock> = self.active_blocks().collect();
        active.sort_by_key(|b| (b.start_time, b.end_time));
        let mut latest: Option<&TimeBlock> = None;
        for block in active {
            if let Some(prev) = latest {
                if block.start_time < prev.end_time {
                    return Err(ValidationError::OverlappingBlocks {
                        first: prev.id.clone(),
                        second: block.id.clone(),
                    });
                }
            }
            if latest.map_or(true, |prev| block.end_time > prev.end_time) {
                latest = Some(block);
            }
        }
        Ok(())
    }
}
