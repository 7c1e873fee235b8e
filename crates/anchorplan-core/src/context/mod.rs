//! Daily context: day-level risk signals, obligation status and historical
//! step durations, supplied by an external provider.
//!
//! The provider is optional in practice. A failed or slow fetch becomes
//! [`DailyContextState::Absent`] and chains are left unenhanced.

mod integrator;

pub use integrator::{ContextIntegrator, ContextSettings, MEDICATION_STEP_NAME};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

use crate::error::ContextError;

/// Prior-day medication status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationStatus {
    pub taken: bool,
    /// Historical adherence, 0.0 to 1.0.
    #[serde(default = "default_reliability")]
    pub reliability: f64,
}

fn default_reliability() -> f64 {
    1.0
}

impl Default for MedicationStatus {
    fn default() -> Self {
        Self {
            taken: true,
            reliability: default_reliability(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DayFlags {
    #[serde(default)]
    pub low_energy_risk: bool,
    #[serde(default)]
    pub sleep_debt_risk: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DailyContext {
    #[serde(default)]
    pub meds: MedicationStatus,
    #[serde(default)]
    pub day_flags: DayFlags,
    /// Step name → observed minutes.
    #[serde(default)]
    pub duration_priors: BTreeMap<String, i64>,
    #[serde(default)]
    pub weather: Option<String>,
}

/// Context as seen by the integrator: present, or explicitly absent.
#[derive(Debug, Clone, PartialEq)]
pub enum DailyContextState {
    Available(DailyContext),
    Absent { reason: String },
}

impl DailyContextState {
    pub fn context(&self) -> Option<&DailyContext> {
        match self {
            Self::Available(ctx) => Some(ctx),
            Self::Absent { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn weather(&self) -> Option<String> {
        self.context().and_then(|c| c.weather.clone())
    }
}

/// Record of what the integrator did to a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEnhancementInfo {
    pub context_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absent_reason: Option<String>,
    pub suggestions_attached: usize,
    #[serde(default)]
    pub injected_steps: Vec<String>,
    #[serde(default)]
    pub priors_applied: Vec<String>,
    /// Display-only; never applied to step durations.
    pub risk_multiplier: f64,
    #[serde(default)]
    pub failures: Vec<EnhancementFailure>,
}

impl ContextEnhancementInfo {
    pub(crate) fn absent(reason: &str) -> Self {
        Self {
            context_available: false,
            absent_reason: Some(reason.to_string()),
            suggestions_attached: 0,
            injected_steps: Vec::new(),
            priors_applied: Vec::new(),
            risk_multiplier: 1.0,
            failures: Vec::new(),
        }
    }
}

/// Integrator sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementStage {
    ExitGateSuggestions,
    StepInjection,
    DurationPriors,
    RiskInflators,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancementFailure {
    pub stage: EnhancementStage,
    pub message: String,
}

/// Daily context collaborator.
#[async_trait]
pub trait DailyContextProvider: Send + Sync {
    async fn daily_context(&self, user_id: &str, date: NaiveDate)
        -> Result<DailyContext, ContextError>;
}

/// Fetch the context, bounded by `timeout`. Never fails.
pub async fn fetch_daily_context(
    provider: &dyn DailyContextProvider,
    user_id: &str,
    date: NaiveDate,
    timeout: StdDuration,
) -> DailyContextState {
    let outcome = match tokio::time::timeout(timeout, provider.daily_context(user_id, date)).await {
        Ok(result) => result,
        Err(_) => Err(ContextError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
    };

    match outcome {
        Ok(context) => DailyContextState::Available(context),
        Err(err) => {
            tracing::warn!(user_id, %date, error = %err, "daily context unavailable, skipping enhancement");
            DailyContextState::Absent {
                reason: err.to_string(),
            }
        }
    }
}

/// Provider returning a fixed context, or "unavailable" when empty.
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    context: Option<DailyContext>,
}

impl StaticContextProvider {
    pub fn new(context: Option<DailyContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl DailyContextProvider for StaticContextProvider {
    async fn daily_context(
        &self,
        _user_id: &str,
        _date: NaiveDate,
    ) -> Result<DailyContext, ContextError> {
        self.context
            .clone()
            .ok_or_else(|| ContextError::Unavailable("no daily context recorded".into()))
    }
}
