//! Shared fixtures for integration tests.

#![allow(dead_code)]

use anchorplan_core::anchor::{Anchor, AnchorType};
use anchorplan_core::plan::{Collaborators, PlanStore};
use anchorplan_core::{
    DailyContext, FixedClock, FixedTravelEstimator, InMemoryPlanStore, PlanBuilder, PlanInput,
    StaticAnchorSource, StaticContextProvider, TravelEstimator,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, h, m, 0).unwrap()
}

pub fn lecture() -> Anchor {
    Anchor::new("a1", "Algorithms", AnchorType::Lecture, at(10, 0), at(12, 0)).with_location("X")
}

pub fn input() -> PlanInput {
    PlanInput {
        user_id: "u1".into(),
        date: date(),
        wake_time: at(7, 0),
        sleep_time: at(23, 0),
        energy_state: Default::default(),
        tasks: Vec::new(),
    }
}

pub struct Harness {
    pub builder: PlanBuilder,
    pub store: Arc<InMemoryPlanStore>,
}

pub fn harness_with(
    anchors: Vec<Anchor>,
    travel: Arc<dyn TravelEstimator>,
    context: Option<DailyContext>,
    now: DateTime<Utc>,
) -> Harness {
    let store = Arc::new(InMemoryPlanStore::new());
    let collaborators = Collaborators {
        anchors: Arc::new(StaticAnchorSource::new(anchors)),
        travel,
        context: Arc::new(StaticContextProvider::new(context)),
        store: store.clone() as Arc<dyn PlanStore>,
        clock: Arc::new(FixedClock(now)),
    };
    Harness {
        builder: PlanBuilder::with_defaults(collaborators),
        store,
    }
}

/// One lecture, 20 minute trips, no context, clock at 06:00.
pub fn harness() -> Harness {
    harness_with(
        vec![lecture()],
        Arc::new(FixedTravelEstimator::new(Some(20))),
        None,
        at(6, 0),
    )
}
