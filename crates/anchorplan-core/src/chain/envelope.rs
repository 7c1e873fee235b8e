//! Five-phase commitment envelope around one anchor.
//!
//! ```text
//! [ prep ][ travel_there ] .. [ anchor ][ travel_back ][ recovery ]
//! ```
//!
//! `prep` spans the backward chain, `anchor` is copied verbatim from the
//! calendar, and every other phase is laid out from those two.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::generator::ChainSettings;
use super::step::{ChainStepInstance, EnvelopeInfo, EnvelopePhase, StepRole};
use crate::anchor::Anchor;
use crate::error::ChainError;
use crate::travel::TravelResolution;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentEnvelope {
    pub envelope_id: String,
    pub prep: ChainStepInstance,
    pub travel_there: ChainStepInstance,
    pub anchor: ChainStepInstance,
    pub travel_back: ChainStepInstance,
    pub recovery: ChainStepInstance,
}

/// Recovery after an anchor: long anchors get the long recovery.
pub fn recovery_minutes(anchor_minutes: i64, settings: &ChainSettings) -> i64 {
    if anchor_minutes >= settings.long_anchor_threshold_minutes {
        settings.long_recovery_minutes
    } else {
        settings.short_recovery_minutes
    }
}

impl CommitmentEnvelope {
    pub(crate) fn build(
        chain_id: &str,
        anchor: &Anchor,
        steps: &[ChainStepInstance],
        travel: &TravelResolution,
        settings: &ChainSettings,
        prep_hint_minutes: Option<i64>,
    ) -> Result<Self, ChainError> {
        let (first, last) = match (steps.first(), steps.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(ChainError::EmptyTemplate {
                    template: anchor.anchor_type.to_string(),
                })
            }
        };

        let envelope_id = format!("envelope-{}", anchor.id);
        let phase_id = |phase: EnvelopePhase| format!("{chain_id}:{}", phase.as_str());
        let annotate = |mut step: ChainStepInstance, phase: EnvelopePhase| {
            step.metadata.envelope = Some(EnvelopeInfo {
                envelope_id: envelope_id.clone(),
                phase,
                prep_duration_hint_minutes: if phase == EnvelopePhase::Prep {
                    prep_hint_minutes
                } else {
                    None
                },
            });
            if matches!(phase, EnvelopePhase::TravelThere | EnvelopePhase::TravelBack) {
                step.metadata.travel_fallback = travel.fallback.clone();
            }
            step
        };

        let prep_minutes = (last.end_time - first.start_time).num_minutes();
        let prep = annotate(
            ChainStepInstance::starting_at(
                phase_id(EnvelopePhase::Prep),
                chain_id,
                "Prep",
                first.start_time,
                prep_minutes,
                StepRole::ChainStep,
            )?,
            EnvelopePhase::Prep,
        );

        let travel_there = annotate(
            ChainStepInstance::starting_at(
                phase_id(EnvelopePhase::TravelThere),
                chain_id,
                format!("Travel to {}", travel.destination),
                prep.end_time,
                travel.minutes,
                StepRole::ChainStep,
            )?,
            EnvelopePhase::TravelThere,
        );

        let mut anchor_step = annotate(
            ChainStepInstance::starting_at(
                phase_id(EnvelopePhase::Anchor),
                chain_id,
                anchor.title.clone(),
                anchor.start,
                anchor.duration_minutes(),
                StepRole::Anchor,
            )?,
            EnvelopePhase::Anchor,
        );
        // Authoritative times, even if minutes would truncate seconds.
        anchor_step.start_time = anchor.start;
        anchor_step.end_time = anchor.end;

        let travel_back = annotate(
            ChainStepInstance::starting_at(
                phase_id(EnvelopePhase::TravelBack),
                chain_id,
                format!("Travel back from {}", travel.destination),
                anchor.end,
                travel.minutes,
                StepRole::ChainStep,
            )?,
            EnvelopePhase::TravelBack,
        );

        let recovery = annotate(
            ChainStepInstance::starting_at(
                phase_id(EnvelopePhase::Recovery),
                chain_id,
                "Recovery",
                travel_back.end_time,
                recovery_minutes(anchor.duration_minutes(), settings),
                StepRole::Recovery,
            )?
            .with_flags(false, true),
            EnvelopePhase::Recovery,
        );

        Ok(Self {
            envelope_id,
            prep,
            travel_there,
            anchor: anchor_step,
            travel_back,
            recovery,
        })
    }

    /// Phases in envelope order.
    pub fn phases(&self) -> [&ChainStepInstance; 5] {
        [
            &self.prep,
            &self.travel_there,
            &self.anchor,
            &self.travel_back,
            &self.recovery,
        ]
    }

    /// Span spent away from home: departure through return.
    pub fn away_span(&self) -> (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>) {
        (
            self.travel_there.start_time.min(self.anchor.start_time),
            self.travel_back.end_time,
        )
    }

    /// Slack between arriving and the anchor starting.
    pub fn arrival_slack(&self) -> Duration {
        self.anchor.start_time - self.travel_there.end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ChainSettings {
        ChainSettings::default()
    }

    #[test]
    fn recovery_table() {
        let s = settings();
        assert_eq!(recovery_minutes(30, &s), 10);
        assert_eq!(recovery_minutes(119, &s), 10);
        assert_eq!(recovery_minutes(120, &s), 20);
        assert_eq!(recovery_minutes(180, &s), 20);
    }
}
