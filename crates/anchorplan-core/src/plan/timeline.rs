//! Interval bookkeeping for plan assembly.
//!
//! Finds free time between already placed blocks so meals, routines, tasks
//! and buffers can be slotted in without overlapping anything.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Returns `None` for empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        Interval::new(self.start.max(other.start), self.end.min(other.end))
    }

    /// Check if this interval can fit `minutes`
    pub fn can_fit(&self, minutes: i64) -> bool {
        Duration::try_minutes(minutes).is_some_and(|needed| self.duration() >= needed)
    }
}

/// Merge overlapping or touching intervals.
pub fn merge(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted = intervals.to_vec();
    sorted.sort();

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Detector for free gaps between busy intervals.
#[derive(Debug, Clone)]
pub struct TimeGapDetector {
    min_gap: Duration,
}

impl TimeGapDetector {
    /// Detector reporting every non-empty gap.
    pub fn new() -> Self {
        Self {
            min_gap: Duration::zero(),
        }
    }

    /// Set the minimum gap duration
    pub fn with_min_gap(mut self, minutes: i64) -> Self {
        self.min_gap = Duration::try_minutes(minutes).unwrap_or(Duration::MAX);
        self
    }

    /// Gaps inside `window` not covered by `busy`, sorted by start.
    pub fn find_gaps(&self, busy: &[Interval], window: Interval) -> Vec<Interval> {
        let mut gaps = Vec::new();
        let mut last_end = window.start;

        for interval in merge(busy) {
            if interval.end <= last_end {
                continue;
            }
            if interval.start >= window.end {
                break;
            }
            if interval.start > last_end {
                self.push_gap(&mut gaps, last_end, interval.start.min(window.end));
            }
            last_end = interval.end.min(window.end);
        }

        if last_end < window.end {
            self.push_gap(&mut gaps, last_end, window.end);
        }
        gaps
    }

    fn push_gap(&self, gaps: &mut Vec<Interval>, start: DateTime<Utc>, end: DateTime<Utc>) {
        if let Some(gap) = Interval::new(start, end) {
            if gap.duration() >= self.min_gap {
                gaps.push(gap);
            }
        }
    }
}

impl Default for TimeGapDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Time already claimed by placed blocks.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    busy: Vec<Interval>,
}

impl Occupancy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, interval: Interval) {
        self.busy.push(interval);
    }

    pub fn is_free(&self, interval: &Interval) -> bool {
        !self.busy.iter().any(|b| b.overlaps(interval))
    }

    /// Free sub-intervals of `window`.
    pub fn free_within(&self, window: Interval) -> Vec<Interval> {
        TimeGapDetector::new().find_gaps(&self.busy, window)
    }

    /// Earliest free `[t, t + minutes)` inside `window`.
    pub fn first_fit(&self, window: Interval, minutes: i64) -> Option<Interval> {
        if minutes <= 0 {
            return None;
        }
        self.free_within(window)
            .into_iter()
            .find(|gap| gap.can_fit(minutes))
            .and_then(|gap| {
                let end = gap.start.checked_add_signed(Duration::try_minutes(minutes)?)?;
                Interval::new(gap.start, end)
            })
    }

    /// Earliest free slot inside any of `windows`.
    pub fn first_fit_in(&self, windows: &[Interval], minutes: i64) -> Option<Interval> {
        windows.iter().find_map(|w| self.first_fit(*w, minutes))
    }
}
