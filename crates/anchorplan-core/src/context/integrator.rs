//! Context-aware chain enhancement.
//!
//! Runs four sub-steps in order against a copy of the chain's steps:
//! exit-gate suggestions, step injection, duration priors and risk
//! inflators. A failing sub-step is logged and recorded, and the chain keeps
//! whatever the previous sub-steps produced. Injection and priors fail when
//! the last step would end after the anchor start minus travel.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration as StdDuration;

use super::{
    ContextEnhancementInfo, DailyContext, DailyContextState, EnhancementFailure, EnhancementStage,
};
use crate::chain::step::offset_minutes;
use crate::chain::{
    insert_step, is_contiguous, recompute_schedule, ChainStepInstance, DurationPriorInfo,
    ExecutionChain, InjectionInfo, InjectionReason, StepRole,
};
use crate::error::{ContextError, ValidationError};

pub const MEDICATION_STEP_NAME: &str = "Take medication";

/// Context integration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_medication_minutes")]
    pub medication_step_minutes: i64,
    #[serde(default = "default_low_energy_factor")]
    pub low_energy_factor: f64,
    #[serde(default = "default_sleep_debt_factor")]
    pub sleep_debt_factor: f64,
    /// Lowercase fragments identifying the wake/bathroom step.
    #[serde(default = "default_wake_markers")]
    pub wake_markers: Vec<String>,
}

fn default_timeout_ms() -> u64 {
    1_500
}
fn default_medication_minutes() -> i64 {
    5
}
fn default_low_energy_factor() -> f64 {
    1.10
}
fn default_sleep_debt_factor() -> f64 {
    1.15
}
fn default_wake_markers() -> Vec<String> {
    vec!["wake".into(), "bathroom".into()]
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            medication_step_minutes: default_medication_minutes(),
            low_energy_factor: default_low_energy_factor(),
            sleep_debt_factor: default_sleep_debt_factor(),
            wake_markers: default_wake_markers(),
        }
    }
}

impl ContextSettings {
    pub fn timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextIntegrator {
    settings: ContextSettings,
}

impl ContextIntegrator {
    pub fn new(settings: ContextSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// Enhance `chain` with the day's context. Never fails; with an absent
    /// context the chain is returned with only an "absent" record attached.
    pub fn enhance(&self, mut chain: ExecutionChain, state: &DailyContextState) -> ExecutionChain {
        let ctx = match state {
            DailyContextState::Available(ctx) => ctx,
            DailyContextState::Absent { reason } => {
                chain.metadata.context = Some(ContextEnhancementInfo::absent(reason));
                return chain;
            }
        };

        let mut info = ContextEnhancementInfo {
            context_available: true,
            absent_reason: None,
            suggestions_attached: 0,
            injected_steps: Vec::new(),
            priors_applied: Vec::new(),
            risk_multiplier: 1.0,
            failures: Vec::new(),
        };

        match self.attach_suggestions(&chain, ctx) {
            Ok((steps, count)) => {
                chain.steps = steps;
                info.suggestions_attached = count;
            }
            Err(err) => record(&mut info, &chain.chain_id, EnhancementStage::ExitGateSuggestions, err),
        }

        match self.inject_steps(&chain, ctx) {
            Ok((steps, injected)) => {
                chain.steps = steps;
                info.injected_steps = injected;
            }
            Err(err) => record(&mut info, &chain.chain_id, EnhancementStage::StepInjection, err),
        }

        match apply_priors(&chain, ctx) {
            Ok((steps, applied)) => {
                chain.steps = steps;
                info.priors_applied = applied;
            }
            Err(err) => record(&mut info, &chain.chain_id, EnhancementStage::DurationPriors, err),
        }

        match self.risk_multiplier(ctx) {
            Ok(multiplier) => info.risk_multiplier = multiplier,
            Err(err) => record(&mut info, &chain.chain_id, EnhancementStage::RiskInflators, err),
        }

        tracing::debug!(
            chain_id = %chain.chain_id,
            suggestions = info.suggestions_attached,
            injected = info.injected_steps.len(),
            priors = info.priors_applied.len(),
            risk_multiplier = info.risk_multiplier,
            failures = info.failures.len(),
            "chain enhanced with daily context"
        );

        chain.metadata.context = Some(info);
        chain
    }

    fn attach_suggestions(
        &self,
        chain: &ExecutionChain,
        ctx: &DailyContext,
    ) -> Result<(Vec<ChainStepInstance>, usize), ContextError> {
        let Some(gate) = chain.steps.iter().position(|s| s.role == StepRole::ExitGate) else {
            return Ok((chain.steps.clone(), 0));
        };

        let mut suggestions = vec!["Keys, phone, wallet".to_string()];
        if let Some(location) = chain.anchor.location() {
            suggestions.push(format!("Confirm route to {location}"));
        }
        if let Some(weather) = ctx.weather.as_deref().map(str::trim).filter(|w| !w.is_empty()) {
            suggestions.push(format!("Dress for the weather: {weather}"));
        }
        if ctx.day_flags.low_energy_risk {
            suggestions.push("Low energy today: pack water and a snack".to_string());
        }
        if ctx.day_flags.sleep_debt_risk {
            suggestions.push("Short on sleep: set a leave-now alarm".to_string());
        }
        if !ctx.meds.taken {
            suggestions.push("Medication taken?".to_string());
        }

        let count = suggestions.len();
        let mut steps = chain.steps.clone();
        steps[gate].metadata.exit_gate_suggestions = suggestions;
        Ok((steps, count))
    }

    fn inject_steps(
        &self,
        chain: &ExecutionChain,
        ctx: &DailyContext,
    ) -> Result<(Vec<ChainStepInstance>, Vec<String>), ContextError> {
        if ctx.meds.taken {
            return Ok((chain.steps.clone(), Vec::new()));
        }
        let minutes = self.settings.medication_step_minutes;
        if minutes <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "context.medication_step_minutes".to_string(),
                message: format!("duration must be positive, got {minutes}"),
            }
            .into());
        }

        let index = chain
            .steps
            .iter()
            .position(|s| {
                let name = s.name.to_lowercase();
                self.settings.wake_markers.iter().any(|m| name.contains(m.as_str()))
            })
            .map(|i| i + 1)
            .unwrap_or(0);

        let start = chain
            .steps
            .first()
            .map(|s| s.start_time)
            .unwrap_or(chain.chain_completion_deadline);
        let mut step = ChainStepInstance::starting_at(
            format!("{}:medication", chain.chain_id),
            chain.chain_id.clone(),
            MEDICATION_STEP_NAME,
            start,
            minutes,
            StepRole::ChainStep,
        )?;
        step.metadata.injection = Some(InjectionInfo {
            reason: InjectionReason::MissedMedication,
            shifted_steps: chain.steps.len() - index,
        });
        let step_id = step.step_id.clone();

        let steps = insert_step(&chain.steps, index, step)?;
        ensure_contiguous(&steps)?;
        ensure_departure(chain, &steps)?;
        Ok((steps, vec![step_id]))
    }

    fn risk_multiplier(&self, ctx: &DailyContext) -> Result<f64, ContextError> {
        let mut multiplier = 1.0;
        if ctx.day_flags.low_energy_risk {
            multiplier *= self.settings.low_energy_factor;
        }
        if ctx.day_flags.sleep_debt_risk {
            multiplier *= self.settings.sleep_debt_factor;
        }
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "risk_multiplier".to_string(),
                message: format!("must be a positive number, got {multiplier}"),
            }
            .into());
        }
        Ok(multiplier)
    }
}

/// Replace step durations with matching priors, cascading each change.
fn apply_priors(
    chain: &ExecutionChain,
    ctx: &DailyContext,
) -> Result<(Vec<ChainStepInstance>, Vec<String>), ContextError> {
    let priors: HashMap<String, (&str, i64)> = ctx
        .duration_priors
        .iter()
        .map(|(name, minutes)| (name.trim().to_lowercase(), (name.as_str(), *minutes)))
        .collect();

    let mut out = chain.steps.clone();
    let mut applied = Vec::new();
    for index in 0..out.len() {
        let Some(&(name, minutes)) = priors.get(&out[index].name.trim().to_lowercase()) else {
            continue;
        };
        if minutes <= 0 {
            return Err(ContextError::InvalidPrior {
                step: name.to_string(),
                minutes,
            });
        }

        let original = out[index].duration_minutes;
        out = recompute_schedule(&out, index, minutes)?;
        out[index].metadata.duration_prior = Some(DurationPriorInfo {
            original_minutes: original,
            prior_minutes: minutes,
        });
        applied.push(out[index].step_id.clone());
    }

    ensure_contiguous(&out)?;
    ensure_departure(chain, &out)?;
    Ok((out, applied))
}

fn ensure_contiguous(steps: &[ChainStepInstance]) -> Result<(), ContextError> {
    if is_contiguous(steps) {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: "chain steps".to_string(),
            message: "steps are no longer contiguous".to_string(),
        }
        .into())
    }
}

/// The last step must end in time to travel and still arrive at the anchor.
fn ensure_departure(chain: &ExecutionChain, steps: &[ChainStepInstance]) -> Result<(), ContextError> {
    let Some(finishes) = steps.last().map(|s| s.end_time) else {
        return Ok(());
    };
    let latest = offset_minutes(chain.anchor.start, chain.metadata.travel.minutes.saturating_neg())?;
    if finishes > latest {
        return Err(ContextError::MissesDeparture { finishes, latest });
    }
    Ok(())
}

fn record(info: &mut ContextEnhancementInfo, chain_id: &str, stage: EnhancementStage, err: ContextError) {
    tracing::warn!(chain_id, ?stage, error = %err, "context enhancement sub-step failed");
    info.failures.push(EnhancementFailure {
        stage,
        message: err.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{Anchor, AnchorType};
    use crate::chain::{ChainGenerator, ChainSettings, TemplateRegistry};
    use crate::context::{DayFlags, MedicationStatus};
    use crate::travel::TravelResolution;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn lecture_chain() -> ExecutionChain {
        let start = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        let anchor = Anchor::new("a1", "Algorithms", AnchorType::Lecture, start, start + Duration::hours(2))
            .with_location("Hall B");
        ChainGenerator::new(Arc::new(TemplateRegistry::builtin()), ChainSettings::default())
            .generate(&anchor, &TravelResolution::estimated(20, "home", "Hall B"))
            .unwrap()
    }

    fn available(ctx: DailyContext) -> DailyContextState {
        DailyContextState::Available(ctx)
    }

    fn missed_meds() -> DailyContext {
        DailyContext {
            meds: MedicationStatus {
                taken: false,
                reliability: 0.6,
            },
            ..DailyContext::default()
        }
    }

    #[test]
    fn absent_context_changes_nothing_but_metadata() {
        let chain = lecture_chain();
        let out = ContextIntegrator::default().enhance(
            chain.clone(),
            &DailyContextState::Absent {
                reason: "offline".into(),
            },
        );
        assert_eq!(out.steps, chain.steps);
        let info = out.metadata.context.unwrap();
        assert!(!info.context_available);
        assert_eq!(info.absent_reason.as_deref(), Some("offline"));
        assert_eq!(info.risk_multiplier, 1.0);
    }

    #[test]
    fn exit_gate_gets_suggestions() {
        let ctx = DailyContext {
            weather: Some("rain".into()),
            day_flags: DayFlags {
                low_energy_risk: true,
                sleep_debt_risk: false,
            },
            ..DailyContext::default()
        };
        let out = ContextIntegrator::default().enhance(lecture_chain(), &available(ctx));
        let gate = out.exit_gate().unwrap();
        let suggestions = &gate.metadata.exit_gate_suggestions;
        assert_eq!(suggestions[0], "Keys, phone, wallet");
        assert!(suggestions.contains(&"Confirm route to Hall B".to_string()));
        assert!(suggestions.iter().any(|s| s.contains("rain")));
        assert!(suggestions.iter().any(|s| s.contains("Low energy")));
        assert_eq!(out.metadata.context.as_ref().unwrap().suggestions_attached, suggestions.len());
    }

    #[test]
    fn medication_injected_after_wake_step() {
        let chain = lecture_chain();
        let out = ContextIntegrator::default().enhance(chain.clone(), &available(missed_meds()));

        assert_eq!(out.steps.len(), chain.steps.len() + 1);
        assert_eq!(out.steps[0].name, "Wake up & bathroom");
        let meds = &out.steps[1];
        assert_eq!(meds.name, MEDICATION_STEP_NAME);
        assert!(meds.is_required);
        assert_eq!(meds.start_time, chain.steps[0].end_time);
        assert_eq!(meds.duration_minutes, 5);
        assert_eq!(meds.metadata.injection.as_ref().unwrap().shifted_steps, chain.steps.len() - 1);

        for (old, new) in chain.steps[1..].iter().zip(&out.steps[2..]) {
            assert_eq!(new.start_time - old.start_time, Duration::minutes(5));
            assert_eq!(new.duration_minutes, old.duration_minutes);
        }
        assert!(is_contiguous(&out.steps));
        assert_eq!(out.metadata.context.unwrap().injected_steps, vec!["chain-a1:medication"]);
    }

    #[test]
    fn medication_goes_first_without_wake_marker() {
        let settings = ContextSettings {
            wake_markers: vec!["nothing-matches".into()],
            ..ContextSettings::default()
        };
        let chain = lecture_chain();
        let out = ContextIntegrator::new(settings).enhance(chain.clone(), &available(missed_meds()));
        assert_eq!(out.steps[0].name, MEDICATION_STEP_NAME);
        assert_eq!(out.steps[0].start_time, chain.steps[0].start_time);
        assert_eq!(out.steps[1].start_time, chain.steps[0].start_time + Duration::minutes(5));
    }

    #[test]
    fn priors_override_and_cascade() {
        let chain = lecture_chain();
        let mut ctx = DailyContext::default();
        ctx.duration_priors.insert("shower".into(), 25);

        let out = ContextIntegrator::default().enhance(chain.clone(), &available(ctx));
        let shower = &out.steps[1];
        assert_eq!(shower.duration_minutes, 25);
        assert_eq!(
            shower.metadata.duration_prior,
            Some(DurationPriorInfo {
                original_minutes: 15,
                prior_minutes: 25
            })
        );
        assert_eq!(out.steps[2].start_time, chain.steps[2].start_time + Duration::minutes(10));
        assert!(is_contiguous(&out.steps));
        // Envelope stays where the generator put it.
        assert_eq!(out.commitment_envelope, chain.commitment_envelope);
    }

    #[test]
    fn bad_prior_fails_only_its_sub_step() {
        let chain = lecture_chain();
        let mut ctx = missed_meds();
        ctx.duration_priors.insert("Shower".into(), 0);
        ctx.day_flags.sleep_debt_risk = true;

        let out = ContextIntegrator::default().enhance(chain.clone(), &available(ctx));
        let info = out.metadata.context.clone().unwrap();

        assert_eq!(info.failures.len(), 1);
        assert_eq!(info.failures[0].stage, EnhancementStage::DurationPriors);
        assert!(info.priors_applied.is_empty());
        // Injection before it still applied, risk after it still computed.
        assert_eq!(info.injected_steps.len(), 1);
        assert!((info.risk_multiplier - 1.15).abs() < 1e-9);
        assert!(out.steps.iter().all(|s| s.metadata.duration_prior.is_none()));
    }

    #[test]
    fn prior_past_latest_departure_keeps_original_steps() {
        let chain = lecture_chain();
        let mut ctx = missed_meds();
        ctx.duration_priors.insert("Shower".into(), 70);

        let out = ContextIntegrator::default().enhance(chain.clone(), &available(ctx));
        let info = out.metadata.context.clone().unwrap();

        assert_eq!(info.failures.len(), 1);
        assert_eq!(info.failures[0].stage, EnhancementStage::DurationPriors);
        assert!(info.failures[0].message.contains("latest departure"));
        assert!(info.priors_applied.is_empty());
        assert_eq!(out.steps.iter().find(|s| s.name == "Shower").unwrap().duration_minutes, 15);
        // Injection still fits: 09:10 is before 10:00 minus 20 min of travel.
        assert_eq!(out.steps.last().unwrap().end_time, chain.steps.last().unwrap().end_time + Duration::minutes(5));
    }

    #[test]
    fn out_of_range_prior_is_recorded_not_raised() {
        let chain = lecture_chain();
        let mut ctx = DailyContext::default();
        ctx.duration_priors.insert("Shower".into(), 10_i64.pow(13));

        let out = ContextIntegrator::default().enhance(chain.clone(), &available(ctx));
        let info = out.metadata.context.unwrap();
        assert_eq!(info.failures[0].stage, EnhancementStage::DurationPriors);
        assert_eq!(out.steps, chain.steps);
    }

    #[test]
    fn oversized_injection_is_rejected() {
        let settings = ContextSettings {
            medication_step_minutes: 60,
            ..ContextSettings::default()
        };
        let chain = lecture_chain();
        let out = ContextIntegrator::new(settings).enhance(chain.clone(), &available(missed_meds()));
        let info = out.metadata.context.unwrap();

        assert_eq!(info.failures[0].stage, EnhancementStage::StepInjection);
        assert!(info.injected_steps.is_empty());
        assert_eq!(out.steps.len(), chain.steps.len());
    }

    #[test]
    fn risk_multiplier_combines_flags() {
        let ctx = DailyContext {
            day_flags: DayFlags {
                low_energy_risk: true,
                sleep_debt_risk: true,
            },
            ..DailyContext::default()
        };
        let chain = lecture_chain();
        let out = ContextIntegrator::default().enhance(chain.clone(), &available(ctx));
        assert!((out.risk_multiplier() - 1.10 * 1.15).abs() < 1e-9);
        // Display-only: durations untouched.
        assert_eq!(
            out.steps.iter().map(|s| s.duration_minutes).collect::<Vec<_>>(),
            chain.steps.iter().map(|s| s.duration_minutes).collect::<Vec<_>>()
        );
    }

    #[test]
    fn invalid_factor_is_recorded() {
        let settings = ContextSettings {
            low_energy_factor: 0.0,
            ..ContextSettings::default()
        };
        let mut ctx = DailyContext::default();
        ctx.day_flags.low_energy_risk = true;
        let out = ContextIntegrator::new(settings).enhance(lecture_chain(), &available(ctx));
        let info = out.metadata.context.unwrap();
        assert_eq!(info.failures[0].stage, EnhancementStage::RiskInflators);
        assert_eq!(info.risk_multiplier, 1.0);
    }
}
