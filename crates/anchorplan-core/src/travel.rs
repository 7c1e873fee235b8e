//! Travel estimator contract.
//!
//! Route computation is a black box behind [`TravelEstimator`]. Whatever the
//! estimator does (error, timeout, nonsense duration) the caller always gets
//! a [`TravelResolution`] back; failures become the default duration plus a
//! [`TravelFallbackInfo`] annotation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration as StdDuration;

use crate::anchor::Anchor;
use crate::chain::step::TravelFallbackInfo;
use crate::error::TravelError;
use crate::plan::EnergyState;

/// Default travel duration when the estimator cannot answer.
pub const FALLBACK_TRAVEL_MINUTES: i64 = 30;

/// Longest trip the estimator may report before it is treated as a failure.
pub const MAX_TRAVEL_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TravelMethod {
    Walk,
    Bike,
    #[default]
    Transit,
    Drive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FitnessLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// Conditions at travel time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelConditions {
    #[serde(default)]
    pub weather: Option<String>,
    pub user_energy: EnergyState,
    /// Latest acceptable arrival.
    pub arrive_by: DateTime<Utc>,
}

/// User travel preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TravelPreferences {
    #[serde(default)]
    pub method: TravelMethod,
    /// Maximum spend per trip, in the user's currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default)]
    pub fitness: FitnessLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelRequest {
    pub origin: String,
    pub destination: String,
    /// Destination came from the fallback point, not the anchor.
    pub destination_defaulted: bool,
    pub conditions: TravelConditions,
    pub preferences: TravelPreferences,
}

impl TravelRequest {
    /// Request for travelling from `origin` to the anchor's location.
    pub fn for_anchor(
        anchor: &Anchor,
        origin: Option<&str>,
        energy: EnergyState,
        weather: Option<String>,
        settings: &TravelSettings,
    ) -> Self {
        let (destination, destination_defaulted) = match anchor.location() {
            Some(location) => (location.to_string(), false),
            None => (settings.default_destination.clone(), true),
        };
        let origin = origin
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(settings.default_origin.as_str())
            .to_string();

        Self {
            origin,
            destination,
            destination_defaulted,
            conditions: TravelConditions {
                weather,
                user_energy: energy,
                arrive_by: anchor.start,
            },
            preferences: settings.preferences.clone(),
        }
    }
}

/// Route returned by an estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelRoute {
    pub duration_minutes: i64,
    #[serde(default)]
    pub method: Option<TravelMethod>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Route computation collaborator.
#[async_trait]
pub trait TravelEstimator: Send + Sync {
    async fn estimate(&self, request: &TravelRequest) -> Result<TravelRoute, TravelError>;
}

/// Travel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_origin")]
    pub default_origin: String,
    #[serde(default = "default_destination")]
    pub default_destination: String,
    #[serde(default)]
    pub preferences: TravelPreferences,
}

fn default_timeout_ms() -> u64 {
    2_000
}
fn default_origin() -> String {
    "home".into()
}
fn default_destination() -> String {
    "default-destination".into()
}

impl Default for TravelSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            default_origin: default_origin(),
            default_destination: default_destination(),
            preferences: TravelPreferences::default(),
        }
    }
}

impl TravelSettings {
    pub fn timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.timeout_ms)
    }
}

/// Travel duration as consumed by the chain generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelResolution {
    pub minutes: i64,
    pub origin: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<TravelFallbackInfo>,
}

impl TravelResolution {
    /// Resolution from a known duration, no fallback.
    pub fn estimated(minutes: i64, origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            minutes,
            origin: origin.into(),
            destination: destination.into(),
            fallback: None,
        }
    }

    /// Resolution using the default duration after `error`.
    pub fn fallback(
        error: &TravelError,
        default_minutes: i64,
        origin: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            minutes: default_minutes,
            origin: origin.into(),
            destination: destination.into(),
            fallback: Some(TravelFallbackInfo {
                reason: error.to_string(),
                default_minutes,
            }),
        }
    }

    pub fn fallback_used(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Ask the estimator, bounded by `timeout`. Never fails.
pub async fn resolve_travel(
    estimator: &dyn TravelEstimator,
    request: &TravelRequest,
    timeout: StdDuration,
    default_minutes: i64,
) -> TravelResolution {
    let outcome = match tokio::time::timeout(timeout, estimator.estimate(request)).await {
        Ok(Ok(route)) if route.duration_minutes <= 0 => Err(TravelError::NonPositiveDuration {
            minutes: route.duration_minutes,
        }),
        Ok(Ok(route)) if route.duration_minutes > MAX_TRAVEL_MINUTES => {
            Err(TravelError::DurationTooLong {
                minutes: route.duration_minutes,
                max: MAX_TRAVEL_MINUTES,
            })
        }
        Ok(Ok(route)) => Ok(route.duration_minutes),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(TravelError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
    };

    match outcome {
        Ok(minutes) => {
            tracing::debug!(
                origin = %request.origin,
                destination = %request.destination,
                minutes,
                "travel estimated"
            );
            TravelResolution::estimated(minutes, &request.origin, &request.destination)
        }
        Err(err) => {
            tracing::warn!(
                origin = %request.origin,
                destination = %request.destination,
                error = %err,
                default_minutes,
                "travel estimator failed, using default duration"
            );
            TravelResolution::fallback(&err, default_minutes, &request.origin, &request.destination)
        }
    }
}

/// Estimator with configured durations.
///
/// Looks up the destination first, then `default_minutes`. With neither it
/// reports itself unavailable.
#[derive(Debug, Clone, Default)]
pub struct FixedTravelEstimator {
    default_minutes: Option<i64>,
    per_destination: HashMap<String, i64>,
}

impl FixedTravelEstimator {
    pub fn new(default_minutes: Option<i64>) -> Self {
        Self {
            default_minutes,
            per_destination: HashMap::new(),
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>, minutes: i64) -> Self {
        self.per_destination.insert(destination.into(), minutes);
        self
    }
}

#[async_trait]
impl TravelEstimator for FixedTravelEstimator {
    async fn estimate(&self, request: &TravelRequest) -> Result<TravelRoute, TravelError> {
        let minutes = self
            .per_destination
            .get(&request.destination)
            .copied()
            .or(self.default_minutes)
            .ok_or_else(|| {
                TravelError::Unavailable(format!("no route known to '{}'", request.destination))
            })?;
        Ok(TravelRoute {
            duration_minutes: minutes,
            method: Some(request.preferences.method),
            summary: None,
        })
    }
}
