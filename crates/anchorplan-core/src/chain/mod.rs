//! Execution chains: preparation steps plus the commitment envelope for one
//! anchor.
//!
//! - [`template`]: per anchor-type step templates
//! - [`generator`]: backward chain + envelope construction
//! - [`envelope`]: the five envelope phases
//! - [`schedule`]: pure re-timing helpers
//! - [`step`]: step instances and their annotations

pub mod envelope;
pub mod generator;
pub mod schedule;
pub mod step;
pub mod template;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anchor::Anchor;
use crate::context::ContextEnhancementInfo;
use crate::error::ValidationError;
use crate::status::ExecutionStatus;
use crate::travel::TravelResolution;

pub use envelope::{recovery_minutes, CommitmentEnvelope};
pub use generator::{ChainGenerator, ChainSettings, CHAIN_COMPLETION_BUFFER_MINUTES};
pub use schedule::{insert_step, is_contiguous, recompute_schedule};
pub use step::{
    ChainStepInstance, DurationPriorInfo, EnvelopeInfo, EnvelopePhase, InjectionInfo,
    InjectionReason, StepMetadata, StepRole, TemplateFallbackInfo, TravelFallbackInfo,
};
pub use template::{ChainStepTemplate, ChainTemplate, TemplateLookup, TemplateRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// Chain-level annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainMetadata {
    /// Template actually used.
    pub template_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_fallback: Option<TemplateFallbackInfo>,
    pub travel: TravelResolution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextEnhancementInfo>,
}

/// One anchor's chain for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionChain {
    pub chain_id: String,
    pub anchor_id: String,
    pub anchor: Anchor,
    pub chain_completion_deadline: DateTime<Utc>,
    pub steps: Vec<ChainStepInstance>,
    pub commitment_envelope: CommitmentEnvelope,
    pub status: ChainStatus,
    pub metadata: ChainMetadata,
}

impl ExecutionChain {
    pub fn exit_gate(&self) -> Option<&ChainStepInstance> {
        self.steps.iter().find(|s| s.role == StepRole::ExitGate)
    }

    pub fn template_fallback(&self) -> bool {
        self.metadata.template_fallback.is_some()
    }

    pub fn travel_fallback(&self) -> bool {
        self.metadata.travel.fallback_used()
    }

    /// Any part of this chain rests on fabricated fallback data.
    pub fn is_estimated(&self) -> bool {
        self.template_fallback() || self.travel_fallback()
    }

    /// Multiplier stored by the context integrator, 1.0 without context.
    pub fn risk_multiplier(&self) -> f64 {
        self.metadata
            .context
            .as_ref()
            .map(|c| c.risk_multiplier)
            .unwrap_or(1.0)
    }

    /// Re-derive the chain status from its steps.
    pub fn refresh_status(&mut self) {
        let terminal = self.steps.iter().filter(|s| s.status.is_terminal()).count();
        self.status = if terminal == 0 {
            ChainStatus::Pending
        } else if terminal == self.steps.len() {
            ChainStatus::Completed
        } else {
            ChainStatus::InProgress
        };
    }

    /// Mark a step complete or skipped.
    ///
    /// # Errors
    /// Returns an error if the step is unknown or already terminal.
    pub fn transition_step(&mut self, step_id: &str, to: ExecutionStatus) -> crate::error::Result<()> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.step_id == step_id)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "step_id".to_string(),
                message: format!("no step '{step_id}' in chain '{}'", self.chain_id),
            })?;
        step.transition_to(to)?;
        self.refresh_status();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::AnchorType;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn chain() -> ExecutionChain {
        let start = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        let anchor = Anchor::new("a", "Meeting", AnchorType::Meeting, start, start + chrono::Duration::hours(1));
        ChainGenerator::new(Arc::new(TemplateRegistry::builtin()), ChainSettings::default())
            .generate(&anchor, &TravelResolution::estimated(15, "home", "office"))
            .unwrap()
    }

    #[test]
    fn status_follows_steps() {
        let mut chain = chain();
        assert_eq!(chain.status, ChainStatus::Pending);

        let ids: Vec<_> = chain.steps.iter().map(|s| s.step_id.clone()).collect();
        chain.transition_step(&ids[0], ExecutionStatus::Completed).unwrap();
        assert_eq!(chain.status, ChainStatus::InProgress);

        for id in &ids[1..] {
            chain.transition_step(id, ExecutionStatus::Skipped).unwrap();
        }
        assert_eq!(chain.status, ChainStatus::Completed);
    }

    #[test]
    fn terminal_step_cannot_transition_again() {
        let mut chain = chain();
        let id = chain.steps[0].step_id.clone();
        chain.transition_step(&id, ExecutionStatus::Skipped).unwrap();
        assert!(chain.transition_step(&id, ExecutionStatus::Completed).is_err());
    }

    #[test]
    fn no_context_means_neutral_multiplier() {
        assert_eq!(chain().risk_multiplier(), 1.0);
    }
}
