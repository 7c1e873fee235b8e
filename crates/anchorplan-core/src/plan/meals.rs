//! Meal windows and placement.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::timeline::{Interval, Occupancy};
use crate::error::ValidationError;

/// A meal and the time of day it may be eaten in ("HH:MM", UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealWindow {
    pub name: String,
    pub start: String,
    pub end: String,
    pub duration_minutes: i64,
}

impl MealWindow {
    pub fn new(name: &str, start: &str, end: &str, duration_minutes: i64) -> Self {
        Self {
            name: name.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            duration_minutes,
        }
    }

    /// Breakfast, lunch and dinner.
    pub fn defaults() -> Vec<MealWindow> {
        vec![
            Self::new("Breakfast", "07:00", "10:00", 20),
            Self::new("Lunch", "11:30", "14:00", 30),
            Self::new("Dinner", "17:30", "20:30", 40),
        ]
    }

    /// The window on `date`.
    pub fn window_on(&self, date: NaiveDate) -> Result<Interval, ValidationError> {
        let start = time_on(date, &self.start, &self.name)?;
        let end = time_on(date, &self.end, &self.name)?;
        Interval::new(start, end).ok_or(ValidationError::InvalidTimeRange { start, end })
    }
}

/// Parse "HH:MM" on `date`.
pub(crate) fn time_on(date: NaiveDate, hhmm: &str, field: &str) -> Result<DateTime<Utc>, ValidationError> {
    parse_hhmm(date, hhmm).ok_or_else(|| ValidationError::InvalidValue {
        field: field.to_string(),
        message: format!("expected HH:MM, got '{hhmm}'"),
    })
}

fn parse_hhmm(date: NaiveDate, hhmm: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = hhmm.trim().split(':').collect();
    if parts.len() != 2 {
        return None;
    }
    let hour: u32 = parts[0].parse().ok()?;
    let minute: u32 = parts[1].parse().ok()?;
    Some(date.and_hms_opt(hour, minute, 0)?.and_utc())
}

/// Why a meal was left out of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealOmission {
    /// The window ended before the plan was generated.
    WindowPassed,
    /// No free home slot inside the window.
    NoRoom,
    /// The configured window could not be parsed.
    InvalidWindow,
}

/// Place `meal` at the earliest free slot inside both its window and a home
/// interval, never before `plan_start`.
pub(crate) fn place_meal(
    meal: &MealWindow,
    date: NaiveDate,
    now: DateTime<Utc>,
    plan_start: DateTime<Utc>,
    home: &[Interval],
    occupancy: &Occupancy,
) -> Result<Interval, MealOmission> {
    let window = meal.window_on(date).map_err(|err| {
        tracing::warn!(meal = %meal.name, error = %err, "skipping meal with invalid window");
        MealOmission::InvalidWindow
    })?;
    if window.end <= now {
        return Err(MealOmission::WindowPassed);
    }

    let earliest = window.start.max(plan_start);
    let candidates: Vec<Interval> = home
        .iter()
        .filter_map(|h| h.intersect(&window))
        .filter_map(|w| Interval::new(w.start.max(earliest), w.end))
        .collect();

    occupancy
        .first_fit_in(&candidates, meal.duration_minutes)
        .ok_or(MealOmission::NoRoom)
}
