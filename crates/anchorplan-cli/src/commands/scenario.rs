//! Scenario files: one day's inputs in a single JSON document.
//!
//! ```json
//! {
//!   "input": { "userId": "u1", "date": "2026-10-19",
//!              "wakeTime": "2026-10-19T07:00:00Z",
//!              "sleepTime": "2026-10-19T23:00:00Z" },
//!   "anchors": [ { "id": "a1", "title": "Algorithms", "type": "lecture",
//!                  "start": "2026-10-19T10:00:00Z",
//!                  "end": "2026-10-19T12:00:00Z", "location": "Hall B" } ],
//!   "travel": { "defaultMinutes": 20, "perDestination": { "Gym": 10 } },
//!   "context": { "meds": { "taken": false } },
//!   "now": "2026-10-19T06:00:00Z"
//! }
//! ```

use anchorplan_core::clock::{Clock, FixedClock, SystemClock};
use anchorplan_core::plan::{Collaborators, PlanStore};
use anchorplan_core::{
    Anchor, Config, DailyContext, FixedTravelEstimator, PlanBuilder, PlanInput, StaticAnchorSource,
    StaticContextProvider,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Travel minutes known to the scenario. Without any entry the estimator
/// reports itself unavailable and the builder falls back.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelTable {
    #[serde(default)]
    pub default_minutes: Option<i64>,
    #[serde(default)]
    pub per_destination: HashMap<String, i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub input: PlanInput,
    #[serde(default)]
    pub anchors: Vec<Anchor>,
    #[serde(default)]
    pub travel: TravelTable,
    /// Missing means the context provider is unavailable.
    #[serde(default)]
    pub context: Option<DailyContext>,
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_location: Option<String>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read scenario {}: {e}", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&raw)
            .map_err(|e| format!("invalid scenario {}: {e}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            anchors = scenario.anchors.len(),
            tasks = scenario.input.tasks.len(),
            "scenario loaded"
        );
        Ok(scenario)
    }

    fn estimator(&self) -> FixedTravelEstimator {
        self.travel
            .per_destination
            .iter()
            .fold(FixedTravelEstimator::new(self.travel.default_minutes), |est, (dest, minutes)| {
                est.with_destination(dest.clone(), *minutes)
            })
    }

    /// Builder wired to this scenario's collaborators.
    ///
    /// `now` overrides the scenario's own clock; with neither the system
    /// clock is used.
    pub fn builder(
        &self,
        config: &Config,
        now: Option<DateTime<Utc>>,
        store: Arc<dyn PlanStore>,
    ) -> Result<PlanBuilder, Box<dyn std::error::Error>> {
        let clock: Arc<dyn Clock> = match now.or(self.now) {
            Some(at) => Arc::new(FixedClock(at)),
            None => Arc::new(SystemClock),
        };
        let collaborators = Collaborators {
            anchors: Arc::new(StaticAnchorSource::new(self.anchors.clone())),
            travel: Arc::new(self.estimator()),
            context: Arc::new(StaticContextProvider::new(self.context.clone())),
            store,
            clock,
        };
        let registry = config.template_registry()?;
        Ok(PlanBuilder::new(collaborators, Arc::new(registry), config))
    }

    pub fn location<'a>(&'a self, flag: Option<&'a str>) -> Option<&'a str> {
        flag.or(self.current_location.as_deref())
    }
}
