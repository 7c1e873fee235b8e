//! Backward chain generation.
//!
//! Given an anchor and a resolved travel duration the generator:
//! 1. computes the chain completion deadline
//!    (`anchor.start - travel - CHAIN_COMPLETION_BUFFER_MINUTES`),
//! 2. walks the anchor type's template backwards from that deadline,
//! 3. wraps the result in a [`CommitmentEnvelope`].
//!
//! Generation is a pure function of its inputs; ids are derived from the
//! anchor and template ids so repeated runs produce identical chains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::envelope::CommitmentEnvelope;
use super::step::{offset_minutes, ChainStepInstance, StepRole, TemplateFallbackInfo};
use super::template::{ChainTemplate, TemplateRegistry};
use super::{ChainMetadata, ChainStatus, ExecutionChain};
use crate::anchor::Anchor;
use crate::error::{ChainError, ValidationError};
use crate::travel::{TravelResolution, FALLBACK_TRAVEL_MINUTES};

/// Fixed slack between finishing the chain plus travel and the anchor start.
pub const CHAIN_COMPLETION_BUFFER_MINUTES: i64 = 45;

/// Chain generation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSettings {
    #[serde(default = "default_buffer")]
    pub chain_completion_buffer_minutes: i64,
    #[serde(default = "default_fallback_travel")]
    pub fallback_travel_minutes: i64,
    #[serde(default = "default_long_anchor")]
    pub long_anchor_threshold_minutes: i64,
    #[serde(default = "default_long_recovery")]
    pub long_recovery_minutes: i64,
    #[serde(default = "default_short_recovery")]
    pub short_recovery_minutes: i64,
}

fn default_buffer() -> i64 {
    CHAIN_COMPLETION_BUFFER_MINUTES
}
fn default_fallback_travel() -> i64 {
    FALLBACK_TRAVEL_MINUTES
}
fn default_long_anchor() -> i64 {
    120
}
fn default_long_recovery() -> i64 {
    20
}
fn default_short_recovery() -> i64 {
    10
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            chain_completion_buffer_minutes: default_buffer(),
            fallback_travel_minutes: default_fallback_travel(),
            long_anchor_threshold_minutes: default_long_anchor(),
            long_recovery_minutes: default_long_recovery(),
            short_recovery_minutes: default_short_recovery(),
        }
    }
}

/// Builds execution chains from anchors.
#[derive(Debug, Clone)]
pub struct ChainGenerator {
    registry: Arc<TemplateRegistry>,
    settings: ChainSettings,
}

impl ChainGenerator {
    pub fn new(registry: Arc<TemplateRegistry>, settings: ChainSettings) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Latest moment preparation must be done for the traveller to leave.
    ///
    /// # Errors
    /// Returns an error if the deadline falls outside the representable range.
    pub fn completion_deadline(
        &self,
        anchor: &Anchor,
        travel_minutes: i64,
    ) -> Result<DateTime<Utc>, ValidationError> {
        let lead = travel_minutes.saturating_add(self.settings.chain_completion_buffer_minutes);
        offset_minutes(anchor.start, lead.saturating_neg())
    }

    /// Generate the chain and envelope for one anchor.
    ///
    /// # Errors
    /// Returns an error if the anchor's time range is empty or inverted, or
    /// the resolved template has no steps.
    pub fn generate(
        &self,
        anchor: &Anchor,
        travel: &TravelResolution,
    ) -> Result<ExecutionChain, ChainError> {
        if anchor.end <= anchor.start {
            return Err(ChainError::InvalidAnchor {
                anchor_id: anchor.id.clone(),
                start: anchor.start,
                end: anchor.end,
            });
        }

        let lookup = self.registry.get_chain_template(&anchor.anchor_type);
        let template_fallback = lookup.fallback_info();
        if let Some(info) = &template_fallback {
            tracing::warn!(
                anchor_id = %anchor.id,
                requested = %info.requested_type,
                used = %info.used_type,
                "no chain template for anchor type, using fallback"
            );
        }

        let chain_id = format!("chain-{}", anchor.id);
        let deadline = self.completion_deadline(anchor, travel.minutes)?;
        let steps = build_backward_chain(
            &chain_id,
            lookup.template,
            deadline,
            template_fallback.as_ref(),
        )?;

        let mut envelope = CommitmentEnvelope::build(
            &chain_id,
            anchor,
            &steps,
            travel,
            &self.settings,
            lookup.template.prep_duration_minutes,
        )?;
        envelope.prep.metadata.template_fallback = template_fallback.clone();

        tracing::debug!(
            chain_id = %chain_id,
            deadline = %deadline,
            steps = steps.len(),
            travel_minutes = travel.minutes,
            travel_fallback = travel.fallback_used(),
            "chain generated"
        );

        Ok(ExecutionChain {
            chain_id,
            anchor_id: anchor.id.clone(),
            anchor: anchor.clone(),
            chain_completion_deadline: deadline,
            steps,
            commitment_envelope: envelope,
            status: ChainStatus::Pending,
            metadata: ChainMetadata {
                template_type: lookup.template.anchor_type.clone(),
                template_fallback,
                travel: travel.clone(),
                context: None,
            },
        })
    }
}

/// Lay the template out backwards so the last step ends at `deadline`.
fn build_backward_chain(
    chain_id: &str,
    template: &ChainTemplate,
    deadline: DateTime<Utc>,
    template_fallback: Option<&TemplateFallbackInfo>,
) -> Result<Vec<ChainStepInstance>, ChainError> {
    if template.steps.is_empty() {
        return Err(ChainError::EmptyTemplate {
            template: template.anchor_type.clone(),
        });
    }

    let mut cursor = deadline;
    let mut steps = Vec::with_capacity(template.steps.len());
    for t in template.steps.iter().rev() {
        let role = if t.is_exit_gate {
            StepRole::ExitGate
        } else {
            StepRole::ChainStep
        };
        let mut step = ChainStepInstance::ending_at(
            format!("{chain_id}:{}", t.id),
            chain_id,
            t.name.clone(),
            cursor,
            t.duration_minutes,
            role,
        )?
        .with_flags(t.is_required, t.can_skip_when_late);
        step.metadata.template_fallback = template_fallback.cloned();
        cursor = step.start_time;
        steps.push(step);
    }
    steps.reverse();
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::AnchorType;
    use crate::chain::schedule::is_contiguous;
    use crate::error::TravelError;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, 0).unwrap()
    }

    fn generator() -> ChainGenerator {
        ChainGenerator::new(Arc::new(TemplateRegistry::builtin()), ChainSettings::default())
    }

    fn lecture() -> Anchor {
        Anchor::new("a1", "Algorithms", AnchorType::Lecture, at(10, 0), at(12, 0)).with_location("X")
    }

    #[test]
    fn end_to_end_lecture_example() {
        let travel = TravelResolution::estimated(20, "home", "X");
        let chain = generator().generate(&lecture(), &travel).unwrap();
        let env = &chain.commitment_envelope;

        assert_eq!(chain.chain_completion_deadline, at(9, 5));
        assert_eq!(chain.steps.last().unwrap().end_time, at(9, 5));
        assert_eq!(env.travel_back.start_time, at(12, 0));
        assert_eq!(env.travel_back.end_time, at(12, 20));
        assert_eq!(env.recovery.start_time, at(12, 20));
        assert_eq!(env.recovery.end_time, at(12, 40));
    }

    #[test]
    fn steps_follow_template_and_are_contiguous() {
        let travel = TravelResolution::estimated(20, "home", "X");
        let chain = generator().generate(&lecture(), &travel).unwrap();
        let template = TemplateRegistry::builtin().get("lecture").unwrap().clone();

        let names: Vec<_> = chain.steps.iter().map(|s| s.name.as_str()).collect();
        let expected: Vec<_> = template.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, expected);
        assert!(is_contiguous(&chain.steps));
        assert_eq!(
            chain.steps[0].start_time,
            at(9, 5) - Duration::minutes(template.total_minutes())
        );
    }

    #[test]
    fn exit_gate_role_is_assigned() {
        let travel = TravelResolution::estimated(20, "home", "X");
        let chain = generator().generate(&lecture(), &travel).unwrap();
        let gates: Vec<_> = chain
            .steps
            .iter()
            .filter(|s| s.role == StepRole::ExitGate)
            .collect();
        assert_eq!(gates.len(), 1);
        assert_eq!(chain.steps.last().unwrap().role, StepRole::ExitGate);
    }

    #[test]
    fn envelope_phases_are_laid_out() {
        let travel = TravelResolution::estimated(20, "home", "X");
        let chain = generator().generate(&lecture(), &travel).unwrap();
        let env = &chain.commitment_envelope;

        assert_eq!(env.prep.start_time, chain.steps[0].start_time);
        assert_eq!(env.prep.end_time, chain.steps.last().unwrap().end_time);
        assert_eq!(env.prep.end_time, env.travel_there.start_time);
        assert_eq!(env.travel_there.duration_minutes, 20);
        assert_eq!(env.anchor.start_time, at(10, 0));
        assert_eq!(env.anchor.end_time, at(12, 0));
        assert_eq!(env.anchor.role, StepRole::Anchor);
        assert_eq!(env.recovery.role, StepRole::Recovery);
        assert_eq!(env.arrival_slack(), Duration::minutes(45));
    }

    #[test]
    fn short_anchor_gets_short_recovery() {
        let anchor = Anchor::new("m", "Standup", AnchorType::Meeting, at(9, 0), at(9, 30));
        let travel = TravelResolution::estimated(10, "home", "office");
        let chain = generator().generate(&anchor, &travel).unwrap();
        assert_eq!(chain.commitment_envelope.recovery.duration_minutes, 10);
    }

    #[test]
    fn unknown_type_is_flagged() {
        let anchor = Anchor::new("y", "Yoga", AnchorType::parse("yoga"), at(18, 0), at(19, 0));
        let travel = TravelResolution::estimated(10, "home", "studio");
        let chain = generator().generate(&anchor, &travel).unwrap();

        assert!(chain.template_fallback());
        assert_eq!(chain.metadata.template_type, "other");
        assert!(chain.steps.iter().all(|s| s.template_fallback()));
        assert!(chain.is_estimated());
    }

    #[test]
    fn travel_fallback_marks_both_travel_phases() {
        let err = TravelError::Unavailable("down".into());
        let travel = TravelResolution::fallback(&err, 30, "home", "X");
        let chain = generator().generate(&lecture(), &travel).unwrap();
        let env = &chain.commitment_envelope;

        assert_eq!(chain.chain_completion_deadline, at(8, 45));
        assert!(env.travel_there.fallback_used());
        assert!(env.travel_back.fallback_used());
        assert!(!env.anchor.fallback_used());
        assert!(chain.is_estimated());
    }

    #[test]
    fn inverted_anchor_is_rejected() {
        let anchor = Anchor::new("bad", "Bad", AnchorType::Lecture, at(12, 0), at(10, 0));
        let travel = TravelResolution::estimated(10, "home", "X");
        let err = generator().generate(&anchor, &travel).unwrap_err();
        assert!(matches!(err, ChainError::InvalidAnchor { .. }));
    }

    #[test]
    fn out_of_range_travel_is_an_error_not_a_panic() {
        let travel = TravelResolution::estimated(10_i64.pow(13), "home", "X");
        let err = generator().generate(&lecture(), &travel).unwrap_err();
        assert!(matches!(err, ChainError::Schedule(_)));
    }

    #[test]
    fn seminar_prep_hint_is_recorded_not_applied() {
        let anchor = Anchor::new("s", "Seminar", AnchorType::Seminar, at(14, 0), at(15, 30));
        let travel = TravelResolution::estimated(15, "home", "Room 4");
        let chain = generator().generate(&anchor, &travel).unwrap();
        let prep = &chain.commitment_envelope.prep;

        let template_minutes = TemplateRegistry::builtin().get("seminar").unwrap().total_minutes();
        assert_eq!(prep.duration_minutes, template_minutes);
        assert_eq!(
            prep.metadata.envelope.as_ref().unwrap().prep_duration_hint_minutes,
            Some(30)
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let travel = TravelResolution::estimated(20, "home", "X");
        let a = generator().generate(&lecture(), &travel).unwrap();
        let b = generator().generate(&lecture(), &travel).unwrap();
        assert_eq!(a, b);
    }
}
