//! Chain step instances and their typed annotations.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TransitionError, ValidationError};
use crate::status::ExecutionStatus;

/// `at` moved by `minutes`.
///
/// # Errors
/// Returns an error if the offset or the resulting time is outside what
/// `chrono` can represent.
pub fn offset_minutes(at: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>, ValidationError> {
    Duration::try_minutes(minutes)
        .and_then(|offset| at.checked_add_signed(offset))
        .ok_or_else(|| out_of_range(at, format!("{minutes} min")))
}

fn out_of_range(at: DateTime<Utc>, offset: String) -> ValidationError {
    ValidationError::InvalidValue {
        field: "time offset".to_string(),
        message: format!("{offset} from {at} is out of range"),
    }
}

/// Position of a step inside a chain or envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepRole {
    ChainStep,
    ExitGate,
    Anchor,
    Recovery,
}

impl StepRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChainStep => "chain-step",
            Self::ExitGate => "exit-gate",
            Self::Anchor => "anchor",
            Self::Recovery => "recovery",
        }
    }
}

/// The five phases of a commitment envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopePhase {
    Prep,
    TravelThere,
    Anchor,
    TravelBack,
    Recovery,
}

impl EnvelopePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prep => "prep",
            Self::TravelThere => "travel_there",
            Self::Anchor => "anchor",
            Self::TravelBack => "travel_back",
            Self::Recovery => "recovery",
        }
    }

    /// Travel and the anchor itself happen away from home.
    pub fn is_away(&self) -> bool {
        matches!(self, Self::TravelThere | Self::Anchor | Self::TravelBack)
    }
}

/// The anchor type had no template and "other" was used instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFallbackInfo {
    pub requested_type: String,
    pub used_type: String,
}

/// The travel estimator failed and the default duration was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelFallbackInfo {
    pub reason: String,
    pub default_minutes: i64,
}

/// Envelope membership of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeInfo {
    pub envelope_id: String,
    pub phase: EnvelopePhase,
    /// Seminar/workshop prep hint. Recorded only; never resizes a phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_duration_hint_minutes: Option<i64>,
}

/// A historical prior replaced the template estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationPriorInfo {
    pub original_minutes: i64,
    pub prior_minutes: i64,
}

/// Why a step was injected by the context integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionReason {
    MissedMedication,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionInfo {
    pub reason: InjectionReason,
    /// Number of later steps pushed forward by the insertion.
    pub shifted_steps: usize,
}

/// Typed annotations carried by a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_fallback: Option<TemplateFallbackInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_fallback: Option<TravelFallbackInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EnvelopeInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_prior: Option<DurationPriorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection: Option<InjectionInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exit_gate_suggestions: Vec<String>,
}

/// One scheduled step of an execution chain or envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStepInstance {
    pub step_id: String,
    pub chain_id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub is_required: bool,
    pub can_skip_when_late: bool,
    #[serde(default)]
    pub status: ExecutionStatus,
    pub role: StepRole,
    #[serde(default)]
    pub metadata: StepMetadata,
}

impl ChainStepInstance {
    /// Step ending at `end_time` and lasting `duration_minutes`.
    pub fn ending_at(
        step_id: impl Into<String>,
        chain_id: impl Into<String>,
        name: impl Into<String>,
        end_time: DateTime<Utc>,
        duration_minutes: i64,
        role: StepRole,
    ) -> Result<Self, ValidationError> {
        let start_time = offset_minutes(end_time, duration_minutes.saturating_neg())?;
        Self::starting_at(step_id, chain_id, name, start_time, duration_minutes, role)
    }

    /// Step starting at `start_time` and lasting `duration_minutes`.
    pub fn starting_at(
        step_id: impl Into<String>,
        chain_id: impl Into<String>,
        name: impl Into<String>,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
        role: StepRole,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            step_id: step_id.into(),
            chain_id: chain_id.into(),
            name: name.into(),
            start_time,
            end_time: offset_minutes(start_time, duration_minutes)?,
            duration_minutes,
            is_required: true,
            can_skip_when_late: false,
            status: ExecutionStatus::Pending,
            role,
            metadata: StepMetadata::default(),
        })
    }

    pub fn with_flags(mut self, is_required: bool, can_skip_when_late: bool) -> Self {
        self.is_required = is_required;
        self.can_skip_when_late = can_skip_when_late;
        self
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Same step moved by `offset`, duration unchanged.
    ///
    /// # Errors
    /// Returns an error if either end leaves the representable range.
    pub fn shifted(&self, offset: Duration) -> Result<Self, ValidationError> {
        let moved = |at: DateTime<Utc>| {
            at.checked_add_signed(offset)
                .ok_or_else(|| out_of_range(at, format!("{} min", offset.num_minutes())))
        };
        let mut step = self.clone();
        step.start_time = moved(self.start_time)?;
        step.end_time = moved(self.end_time)?;
        Ok(step)
    }

    pub fn fallback_used(&self) -> bool {
        self.metadata.travel_fallback.is_some()
    }

    pub fn template_fallback(&self) -> bool {
        self.metadata.template_fallback.is_some()
    }

    pub fn envelope_phase(&self) -> Option<EnvelopePhase> {
        self.metadata.envelope.as_ref().map(|e| e.phase)
    }

    /// Transition to a terminal status.
    ///
    /// Returns an error if the step is already terminal.
    pub fn transition_to(&mut self, to: ExecutionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(&to) {
            return Err(TransitionError {
                subject: self.step_id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, 0).unwrap()
    }

    #[test]
    fn ending_at_places_window_before_end() {
        let step = ChainStepInstance::ending_at("s", "c", "Pack bag", at(9, 5), 10, StepRole::ChainStep).unwrap();
        assert_eq!(step.start_time, at(8, 55));
        assert_eq!(step.end_time, at(9, 5));
        assert_eq!(step.duration(), Duration::minutes(10));
    }

    #[test]
    fn shifted_keeps_duration() {
        let step = ChainStepInstance::starting_at("s", "c", "Shower", at(8, 0), 15, StepRole::ChainStep).unwrap();
        let moved = step.shifted(Duration::minutes(5)).unwrap();
        assert_eq!(moved.start_time, at(8, 5));
        assert_eq!(moved.duration_minutes, 15);
        assert_eq!(moved.duration(), step.duration());
    }

    #[test]
    fn oversized_duration_is_an_error() {
        let err = ChainStepInstance::starting_at("s", "c", "Shower", at(8, 0), 10_i64.pow(13), StepRole::ChainStep)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
        assert!(ChainStepInstance::ending_at("s", "c", "Shower", at(8, 0), i64::MAX, StepRole::ChainStep).is_err());
    }

    #[test]
    fn shift_past_representable_range_is_an_error() {
        let step = ChainStepInstance::starting_at("s", "c", "Shower", at(8, 0), 15, StepRole::ChainStep).unwrap();
        assert!(step.shifted(Duration::days(1_000_000_000)).is_err());
    }

    #[test]
    fn completed_step_rejects_second_transition() {
        let mut step = ChainStepInstance::starting_at("s", "c", "Shower", at(8, 0), 15, StepRole::ChainStep).unwrap();
        step.transition_to(ExecutionStatus::Completed).unwrap();
        let err = step.transition_to(ExecutionStatus::Skipped).unwrap_err();
        assert_eq!(err.from, ExecutionStatus::Completed);
        assert_eq!(err.to, ExecutionStatus::Skipped);
        assert_eq!(step.status, ExecutionStatus::Completed);
    }

    #[test]
    fn role_serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&StepRole::ExitGate).unwrap(), "\"exit-gate\"");
        assert_eq!(serde_json::to_string(&StepRole::ChainStep).unwrap(), "\"chain-step\"");
    }
}
