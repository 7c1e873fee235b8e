//! Runtime sequencing of plan blocks.
//!
//! The sequencer borrows a plan and drives its blocks through
//! `pending -> completed | skipped`. Transitions go through each block's
//! atomic status cell, so several sequencers over the same shared plan
//! never lose an update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::plan::{DailyPlan, TimeBlock};
use crate::status::ExecutionStatus;

/// Block counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Sequencer<'a> {
    plan: &'a DailyPlan,
}

impl<'a> Sequencer<'a> {
    pub fn new(plan: &'a DailyPlan) -> Self {
        Self { plan }
    }

    fn pending(&self) -> impl Iterator<Item = &'a TimeBlock> {
        self.plan.time_blocks.iter().filter(|b| b.is_pending())
    }

    /// The pending block containing `now`, else the earliest pending block.
    pub fn current_block(&self, now: DateTime<Utc>) -> Option<&'a TimeBlock> {
        self.pending()
            .filter(|b| b.contains(now))
            .min_by_key(|b| b.sequence_order)
            .or_else(|| self.pending().min_by_key(|b| b.sequence_order))
    }

    /// Up to `n` pending blocks after the current one, in sequence order.
    pub fn next_blocks(&self, n: usize, now: DateTime<Utc>) -> Vec<&'a TimeBlock> {
        let Some(current) = self.current_block(now) else {
            return Vec::new();
        };
        let mut after: Vec<&TimeBlock> = self
            .pending()
            .filter(|b| b.sequence_order > current.sequence_order)
            .collect();
        after.sort_by_key(|b| b.sequence_order);
        after.truncate(n);
        after
    }

    pub fn block(&self, block_id: &str) -> Option<&'a TimeBlock> {
        self.plan.block(block_id)
    }

    /// # Errors
    /// Returns an error if the block is not pending.
    pub fn mark_block_complete(&self, block: &TimeBlock) -> Result<(), TransitionError> {
        block.state.transition(&block.id, ExecutionStatus::Completed, None)?;
        tracing::debug!(block_id = %block.id, "block completed");
        Ok(())
    }

    /// # Errors
    /// Returns an error if the block is not pending.
    pub fn mark_block_skipped(&self, block: &TimeBlock, reason: &str) -> Result<(), TransitionError> {
        block
            .state
            .transition(&block.id, ExecutionStatus::Skipped, Some(reason.to_string()))?;
        tracing::debug!(block_id = %block.id, reason, "block skipped");
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        self.plan
            .time_blocks
            .iter()
            .fold(Progress::default(), |mut p, block| {
                p.total += 1;
                match block.status() {
                    ExecutionStatus::Pending => p.pending += 1,
                    ExecutionStatus::Completed => p.completed += 1,
                    ExecutionStatus::Skipped => p.skipped += 1,
                }
                p
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ActivityType, BlockMetadata, BlockSource, Interval, LocationState, PlanStatus};
    use chrono::{NaiveDate, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, 0).unwrap()
    }

    fn plan() -> DailyPlan {
        let blocks = [(8, 9), (9, 10), (10, 11), (11, 12)]
            .iter()
            .enumerate()
            .map(|(i, (s, e))| {
                let mut block = TimeBlock::new(
                    format!("b{}", i + 1),
                    "p1",
                    Interval::new(at(*s, 0), at(*e, 0)).unwrap(),
                    ActivityType::Task,
                    format!("Block {}", i + 1),
                    BlockMetadata::new(BlockSource::Task, LocationState::AtHome),
                );
                block.sequence_order = i as u32 + 1;
                block
            })
            .collect();
        DailyPlan {
            id: "p1".into(),
            user_id: "u1".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            wake_time: at(8, 0),
            sleep_time: at(12, 0),
            plan_start: at(8, 0),
            energy_state: Default::default(),
            status: PlanStatus::Pending,
            time_blocks: blocks,
        }
    }

    #[test]
    fn current_block_contains_now() {
        let plan = plan();
        let seq = Sequencer::new(&plan);
        assert_eq!(seq.current_block(at(9, 30)).unwrap().id, "b2");
    }

    #[test]
    fn current_block_falls_back_to_earliest_pending() {
        let plan = plan();
        let seq = Sequencer::new(&plan);
        seq.mark_block_complete(seq.block("b1").unwrap()).unwrap();
        // 07:00 is before every block.
        assert_eq!(seq.current_block(at(7, 0)).unwrap().id, "b2");
    }

    #[test]
    fn current_block_skips_terminal_blocks() {
        let plan = plan();
        let seq = Sequencer::new(&plan);
        seq.mark_block_skipped(seq.block("b2").unwrap(), "late").unwrap();
        let current = seq.current_block(at(9, 30)).unwrap();
        assert_eq!(current.id, "b1");
        assert!(current.is_pending());
    }

    #[test]
    fn no_pending_blocks_means_none() {
        let plan = plan();
        let seq = Sequencer::new(&plan);
        for block in &plan.time_blocks {
            seq.mark_block_complete(block).unwrap();
        }
        assert!(seq.current_block(at(9, 0)).is_none());
        assert!(seq.next_blocks(3, at(9, 0)).is_empty());
    }

    #[test]
    fn next_blocks_are_strictly_after_current() {
        let plan = plan();
        let seq = Sequencer::new(&plan);
        seq.mark_block_skipped(seq.block("b3").unwrap(), "not needed").unwrap();
        let next: Vec<_> = seq.next_blocks(5, at(8, 15)).iter().map(|b| b.id.as_str()).collect();
        assert_eq!(next, vec!["b2", "b4"]);
        assert_eq!(seq.next_blocks(1, at(8, 15)).len(), 1);
    }

    #[test]
    fn terminal_block_rejects_transition() {
        let plan = plan();
        let seq = Sequencer::new(&plan);
        let b1 = seq.block("b1").unwrap();
        seq.mark_block_complete(b1).unwrap();
        assert!(seq.mark_block_complete(b1).is_err());
        assert!(seq.mark_block_skipped(b1, "late").is_err());
        assert_eq!(b1.status(), ExecutionStatus::Completed);
    }

    #[test]
    fn progress_counts_statuses() {
        let plan = plan();
        let seq = Sequencer::new(&plan);
        seq.mark_block_complete(seq.block("b1").unwrap()).unwrap();
        seq.mark_block_skipped(seq.block("b2").unwrap(), "late").unwrap();
        assert_eq!(
            seq.progress(),
            Progress {
                total: 4,
                pending: 2,
                completed: 1,
                skipped: 1
            }
        );
    }
}
