//! Plan time blocks and their atomic status cell.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use super::timeline::Interval;
use super::{ActivityType, LocationState};
use crate::chain::EnvelopePhase;
use crate::error::TransitionError;
use crate::status::ExecutionStatus;

/// What produced a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSource {
    WakeRamp,
    Chain,
    ArrivalBuffer,
    Meal,
    Routine,
    Task,
    /// Buffer filling unallocated time.
    Filler,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadata {
    pub source: BlockSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<EnvelopePhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub location_state: LocationState,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default)]
    pub template_fallback: bool,
    /// Minutes the outbound departure moved past the envelope's plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_slip_minutes: Option<i64>,
}

impl BlockMetadata {
    pub fn new(source: BlockSource, location_state: LocationState) -> Self {
        Self {
            source,
            chain_id: None,
            step_id: None,
            anchor_id: None,
            phase: None,
            task_id: None,
            location_state,
            fallback_used: false,
            template_fallback: false,
            departure_slip_minutes: None,
        }
    }
}

/// Serialized form of [`BlockStatusCell`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockStatusRecord {
    #[serde(default)]
    status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skip_reason: Option<String>,
}

/// Block status with compare-and-set transitions.
///
/// Only `Pending -> Completed` and `Pending -> Skipped` succeed; of two
/// racing transitions exactly one wins. The skip reason is published after
/// the status flips.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(from = "BlockStatusRecord", into = "BlockStatusRecord")]
pub struct BlockStatusCell {
    status: AtomicU8,
    skip_reason: OnceLock<String>,
}

impl BlockStatusCell {
    pub fn new(status: ExecutionStatus) -> Self {
        Self {
            status: AtomicU8::new(status.as_u8()),
            skip_reason: OnceLock::new(),
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        ExecutionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.get().map(String::as_str)
    }

    pub(crate) fn transition(
        &self,
        subject: &str,
        to: ExecutionStatus,
        reason: Option<String>,
    ) -> Result<(), TransitionError> {
        let from = ExecutionStatus::Pending;
        if !from.can_transition_to(&to) {
            return Err(TransitionError {
                subject: subject.to_string(),
                from: self.status(),
                to,
            });
        }
        match self
            .status
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                if let Some(reason) = reason {
                    let _ = self.skip_reason.set(reason);
                }
                Ok(())
            }
            Err(actual) => Err(TransitionError {
                subject: subject.to_string(),
                from: ExecutionStatus::from_u8(actual),
                to,
            }),
        }
    }
}

impl Clone for BlockStatusCell {
    fn clone(&self) -> Self {
        let cell = Self::new(self.status());
        if let Some(reason) = self.skip_reason.get() {
            let _ = cell.skip_reason.set(reason.clone());
        }
        cell
    }
}

impl PartialEq for BlockStatusCell {
    fn eq(&self, other: &Self) -> bool {
        self.status() == other.status() && self.skip_reason() == other.skip_reason()
    }
}

impl From<BlockStatusRecord> for BlockStatusCell {
    fn from(record: BlockStatusRecord) -> Self {
        let cell = Self::new(record.status);
        if let Some(reason) = record.skip_reason {
            let _ = cell.skip_reason.set(reason);
        }
        cell
    }
}

impl From<BlockStatusCell> for BlockStatusRecord {
    fn from(cell: BlockStatusCell) -> Self {
        Self {
            status: cell.status(),
            skip_reason: cell.skip_reason.into_inner(),
        }
    }
}

/// One scheduled slice of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBlock {
    pub id: String,
    pub plan_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub activity_type: ActivityType,
    pub activity_name: String,
    pub is_fixed: bool,
    pub is_required: bool,
    pub sequence_order: u32,
    #[serde(flatten)]
    pub state: BlockStatusCell,
    pub metadata: BlockMetadata,
}

impl TimeBlock {
    pub fn new(
        id: impl Into<String>,
        plan_id: impl Into<String>,
        interval: Interval,
        activity_type: ActivityType,
        activity_name: impl Into<String>,
        metadata: BlockMetadata,
    ) -> Self {
        Self {
            id: id.into(),
            plan_id: plan_id.into(),
            start_time: interval.start,
            end_time: interval.end,
            activity_type,
            activity_name: activity_name.into(),
            is_fixed: false,
            is_required: false,
            sequence_order: 0,
            state: BlockStatusCell::default(),
            metadata,
        }
    }

    pub fn with_flags(mut self, is_fixed: bool, is_required: bool) -> Self {
        self.is_fixed = is_fixed;
        self.is_required = is_required;
        self
    }

    pub fn status(&self) -> ExecutionStatus {
        self.state.status()
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.state.skip_reason()
    }

    pub fn is_pending(&self) -> bool {
        self.status() == ExecutionStatus::Pending
    }

    /// Skipped blocks no longer occupy their time.
    pub fn occupies_time(&self) -> bool {
        self.status() != ExecutionStatus::Skipped
    }

    /// Rests on fallback travel or template data.
    pub fn is_estimated(&self) -> bool {
        self.metadata.fallback_used || self.metadata.template_fallback
    }

    pub fn interval(&self) -> Interval {
        Interval {
            start: self.start_time,
            end: self.end_time,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_time <= at && at < self.end_time
    }

    pub fn overlaps(&self, other: &TimeBlock) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}
