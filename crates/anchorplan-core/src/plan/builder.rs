//! Daily plan assembly.
//!
//! Pipeline for one day:
//! 1. fetch anchors and the daily context,
//! 2. per anchor, concurrently: travel estimate -> chain -> context
//!    enhancement (failures and panics isolated per anchor),
//! 3. flatten chains into blocks (fixed blocks first),
//! 4. wake ramp, meals, routines and tasks into free home time,
//! 5. buffers into every remaining gap,
//! 6. sequence, validate, save.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::block::{BlockMetadata, BlockSource, TimeBlock};
use super::degrade::{self, DegradeSummary};
use super::meals::{self, MealOmission, MealWindow};
use super::store::PlanStore;
use super::timeline::{merge, Interval, Occupancy, TimeGapDetector};
use super::{ActivityType, DailyPlan, EnergyState, LocationState, PlanInput, PlanStatus};
use crate::anchor::{Anchor, AnchorSource};
use crate::chain::{
    ChainGenerator, ChainStepInstance, EnvelopePhase, ExecutionChain, StepRole, TemplateRegistry,
};
use crate::chain::step::offset_minutes;
use crate::clock::Clock;
use crate::context::{fetch_daily_context, ContextIntegrator, DailyContextProvider, DailyContextState};
use crate::error::{ChainError, PlanError, ValidationError};
use crate::storage::Config;
use crate::travel::{resolve_travel, TravelEstimator, TravelRequest, TravelSettings};

/// Shortest gap worth a buffer block.
pub(crate) const MIN_BUFFER_MINUTES: i64 = 1;

/// A routine placed at or after its preferred start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineTemplate {
    pub name: String,
    /// "HH:MM"
    pub preferred_start: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub is_required: bool,
}

/// Plan assembly configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerSettings {
    #[serde(default = "default_wake_ramp")]
    pub wake_ramp_minutes: i64,
    #[serde(default = "MealWindow::defaults")]
    pub meals: Vec<MealWindow>,
    #[serde(default)]
    pub routines: Vec<RoutineTemplate>,
}

fn default_wake_ramp() -> i64 {
    30
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            wake_ramp_minutes: default_wake_ramp(),
            meals: MealWindow::defaults(),
            routines: Vec::new(),
        }
    }
}

/// External collaborators the builder talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub anchors: Arc<dyn AnchorSource>,
    pub travel: Arc<dyn TravelEstimator>,
    pub context: Arc<dyn DailyContextProvider>,
    pub store: Arc<dyn PlanStore>,
    pub clock: Arc<dyn Clock>,
}

/// An anchor left out of the plan and why.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorFailure {
    pub anchor_id: String,
    pub error: ChainError,
}

/// Chains for one batch of anchors, in anchor order.
#[derive(Debug, Clone, Default)]
pub struct ChainBatch {
    pub chains: Vec<ExecutionChain>,
    pub failures: Vec<AnchorFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmittedMeal {
    pub name: String,
    pub reason: MealOmission,
}

/// Result of [`PlanBuilder::generate_daily_plan`].
#[derive(Debug, Clone)]
pub struct GeneratedPlan {
    pub plan: DailyPlan,
    pub chains: Vec<ExecutionChain>,
    pub failures: Vec<AnchorFailure>,
    pub context_available: bool,
    /// Ids of tasks that did not fit.
    pub unscheduled_tasks: Vec<String>,
    pub omitted_meals: Vec<OmittedMeal>,
}

pub struct PlanBuilder {
    collaborators: Collaborators,
    generator: ChainGenerator,
    integrator: ContextIntegrator,
    travel: TravelSettings,
    settings: PlannerSettings,
}

impl PlanBuilder {
    pub fn new(collaborators: Collaborators, registry: Arc<TemplateRegistry>, config: &Config) -> Self {
        Self {
            collaborators,
            generator: ChainGenerator::new(registry, config.chain.clone()),
            integrator: ContextIntegrator::new(config.context.clone()),
            travel: config.travel.clone(),
            settings: config.planner.clone(),
        }
    }

    /// Builder with built-in templates and default settings.
    pub fn with_defaults(collaborators: Collaborators) -> Self {
        Self::new(
            collaborators,
            Arc::new(TemplateRegistry::builtin()),
            &Config::default(),
        )
    }

    pub fn generator(&self) -> &ChainGenerator {
        &self.generator
    }

    /// Run the chain pipeline for every anchor concurrently.
    ///
    /// Output keeps anchor order. A failing or panicking anchor is recorded
    /// in `failures` and the rest carry on.
    pub async fn generate_chains(
        &self,
        anchors: &[Anchor],
        origin: Option<&str>,
        energy: EnergyState,
        context: &DailyContextState,
    ) -> ChainBatch {
        let pipelines = anchors.iter().map(|anchor| {
            AssertUnwindSafe(self.chain_pipeline(anchor, origin, energy, context)).catch_unwind()
        });
        let results = join_all(pipelines).await;

        let mut batch = ChainBatch::default();
        for (anchor, result) in anchors.iter().zip(results) {
            let error = match result {
                Ok(Ok(chain)) => {
                    batch.chains.push(chain);
                    continue;
                }
                Ok(Err(err)) => err,
                Err(payload) => ChainError::Panicked {
                    anchor_id: anchor.id.clone(),
                    message: panic_message(payload.as_ref()),
                },
            };
            tracing::warn!(anchor_id = %anchor.id, error = %error, "chain generation failed, anchor omitted");
            batch.failures.push(AnchorFailure {
                anchor_id: anchor.id.clone(),
                error,
            });
        }
        batch
    }

    async fn chain_pipeline(
        &self,
        anchor: &Anchor,
        origin: Option<&str>,
        energy: EnergyState,
        context: &DailyContextState,
    ) -> Result<ExecutionChain, ChainError> {
        let request = TravelRequest::for_anchor(anchor, origin, energy, context.weather(), &self.travel);
        let travel = resolve_travel(
            self.collaborators.travel.as_ref(),
            &request,
            self.travel.timeout(),
            self.generator.settings().fallback_travel_minutes,
        )
        .await;
        let chain = self.generator.generate(anchor, &travel)?;
        Ok(self.integrator.enhance(chain, context))
    }

    /// Build, validate and save the plan for `input.date`.
    ///
    /// # Errors
    /// Fails if the day window is empty, anchors cannot be fetched, the
    /// assembled plan breaks a block invariant, or saving fails. Per-anchor
    /// and collaborator failures are not errors.
    pub async fn generate_daily_plan(
        &self,
        input: &PlanInput,
        current_location: Option<&str>,
    ) -> Result<GeneratedPlan, PlanError> {
        let now = self.collaborators.clock.now();
        let plan_start = input.wake_time.max(now);
        let day = Interval::new(plan_start, input.sleep_time).ok_or(
            ValidationError::InvalidTimeRange {
                start: plan_start,
                end: input.sleep_time,
            },
        )?;

        let (anchors, context) = futures::join!(
            self.collaborators.anchors.anchors_for(input.date),
            fetch_daily_context(
                self.collaborators.context.as_ref(),
                &input.user_id,
                input.date,
                self.integrator.settings().timeout(),
            )
        );
        let anchors = anchors?;
        let batch = self
            .generate_chains(&anchors, current_location, input.energy_state, &context)
            .await;

        let plan_id = uuid::Uuid::new_v4().to_string();
        let mut assembly = Assembly::new(&plan_id, day);
        assembly.add_chains(&batch.chains);
        let home = assembly.home_intervals();

        if plan_start == input.wake_time {
            assembly.add_wake_ramp(input.wake_time, self.settings.wake_ramp_minutes);
        }

        let mut omitted_meals = Vec::new();
        for meal in &self.settings.meals {
            match meals::place_meal(meal, input.date, now, plan_start, &home, &assembly.occupancy) {
                Ok(slot) => assembly.add_meal(meal, slot),
                Err(reason) => {
                    tracing::debug!(meal = %meal.name, ?reason, "meal omitted");
                    omitted_meals.push(OmittedMeal {
                        name: meal.name.clone(),
                        reason,
                    });
                }
            }
        }

        for (index, routine) in self.settings.routines.iter().enumerate() {
            assembly.add_routine(index, routine, input, &home);
        }

        let unscheduled_tasks = assembly.add_tasks(input, &home);
        assembly.fill_buffers();
        let time_blocks = assembly.blocks;

        let mut plan = DailyPlan {
            id: plan_id,
            user_id: input.user_id.clone(),
            date: input.date,
            wake_time: input.wake_time,
            sleep_time: input.sleep_time,
            plan_start,
            energy_state: input.energy_state,
            status: PlanStatus::Pending,
            time_blocks,
        };
        plan.resequence();
        plan.validate()?;
        self.collaborators.store.save(&plan)?;

        tracing::info!(
            plan_id = %plan.id,
            date = %plan.date,
            blocks = plan.time_blocks.len(),
            chains = batch.chains.len(),
            failed_anchors = batch.failures.len(),
            context_available = context.is_available(),
            unscheduled_tasks = unscheduled_tasks.len(),
            "daily plan generated"
        );

        Ok(GeneratedPlan {
            plan,
            chains: batch.chains,
            failures: batch.failures,
            context_available: context.is_available(),
            unscheduled_tasks,
            omitted_meals,
        })
    }

    /// Load, degrade and save a stored plan.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `AlreadyDegraded` on a second call.
    pub fn degrade_plan(&self, plan_id: &str) -> Result<(DailyPlan, DegradeSummary), PlanError> {
        let mut plan = self
            .collaborators
            .store
            .load(plan_id)?
            .ok_or_else(|| PlanError::NotFound {
                plan_id: plan_id.to_string(),
            })?;
        let summary = degrade::degrade_plan(&mut plan)?;
        self.collaborators.store.save(&plan)?;
        Ok((plan, summary))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Buffer blocks for every free gap of `day` not covered by `occupied`.
pub(crate) fn filler_blocks(
    plan_id: &str,
    occupied: &[Interval],
    day: Interval,
    not_home: &[Interval],
) -> Vec<TimeBlock> {
    TimeGapDetector::new()
        .with_min_gap(MIN_BUFFER_MINUTES)
        .find_gaps(occupied, day)
        .into_iter()
        .map(|gap| {
            let location = if not_home.iter().any(|n| n.overlaps(&gap)) {
                LocationState::NotHome
            } else {
                LocationState::AtHome
            };
            TimeBlock::new(
                format!("{plan_id}:buffer-{}", gap.start.format("%Y%m%dT%H%M%S")),
                plan_id,
                gap,
                ActivityType::Buffer,
                "Buffer",
                BlockMetadata::new(BlockSource::Filler, location),
            )
        })
        .collect()
}

/// Blocks placed so far plus the time they claim.
struct Assembly<'a> {
    plan_id: &'a str,
    day: Interval,
    blocks: Vec<TimeBlock>,
    occupancy: Occupancy,
    not_home: Vec<Interval>,
}

impl<'a> Assembly<'a> {
    fn new(plan_id: &'a str, day: Interval) -> Self {
        Self {
            plan_id,
            day,
            blocks: Vec::new(),
            occupancy: Occupancy::new(),
            not_home: Vec::new(),
        }
    }

    fn push(&mut self, block: TimeBlock) {
        self.occupancy.reserve(block.interval());
        self.blocks.push(block);
    }

    /// Keep a fixed block unless it is already over.
    fn place_fixed(&mut self, block: TimeBlock) {
        if block.end_time <= self.day.start {
            tracing::debug!(block = %block.id, "fixed block already elapsed, dropping it");
            return;
        }
        self.push(block);
    }

    /// Shrink a flexible block to the earliest free part of its own range.
    fn place_flexible(&mut self, mut block: TimeBlock) -> bool {
        let slot = block
            .interval()
            .intersect(&self.day)
            .and_then(|window| {
                self.occupancy
                    .free_within(window)
                    .into_iter()
                    .find(|gap| gap.can_fit(MIN_BUFFER_MINUTES))
            });
        match slot {
            Some(slot) => {
                block.start_time = slot.start;
                block.end_time = slot.end;
                self.push(block);
                true
            }
            None => {
                tracing::debug!(block = %block.id, "no free time left for block, dropping it");
                false
            }
        }
    }

    fn add_chains(&mut self, chains: &[ExecutionChain]) {
        let mut flexible = Vec::new();
        for chain in chains {
            let (fixed, rest) = self.flatten_chain(chain);
            for block in fixed {
                self.place_fixed(block);
            }
            flexible.extend(rest);
        }
        for block in flexible {
            self.place_flexible(block);
        }
    }

    /// Split one chain into fixed and flexible blocks and record its
    /// not-home span.
    fn flatten_chain(&mut self, chain: &ExecutionChain) -> (Vec<TimeBlock>, Vec<TimeBlock>) {
        let envelope = &chain.commitment_envelope;
        let planned_departure = envelope.travel_there.start_time;
        let departure = chain
            .steps
            .last()
            .map(|s| s.end_time.max(planned_departure))
            .unwrap_or(planned_departure);
        let arrival = departure + envelope.travel_there.duration();
        let slip = (departure - planned_departure).num_minutes();

        if let Some(span) = Interval::new(departure, envelope.travel_back.end_time) {
            self.not_home.push(span);
        }

        let mut fixed = Vec::new();
        let mut flexible = Vec::new();

        for step in &chain.steps {
            let block = self.chain_block(
                chain,
                step,
                step.start_time,
                step.end_time,
                Some(EnvelopePhase::Prep),
                LocationState::AtHome,
            );
            if step.is_required {
                fixed.push(block.with_flags(true, true));
            } else {
                flexible.push(block);
            }
        }

        let mut travel_there = self
            .chain_block(
                chain,
                &envelope.travel_there,
                departure,
                arrival,
                Some(EnvelopePhase::TravelThere),
                LocationState::NotHome,
            )
            .with_flags(true, true);
        if slip > 0 {
            travel_there.metadata.departure_slip_minutes = Some(slip);
        }
        fixed.push(travel_there);

        if let Some(wait) = Interval::new(arrival, chain.anchor.start) {
            let mut metadata = BlockMetadata::new(BlockSource::ArrivalBuffer, LocationState::NotHome);
            metadata.chain_id = Some(chain.chain_id.clone());
            metadata.anchor_id = Some(chain.anchor_id.clone());
            metadata.template_fallback = chain.template_fallback();
            metadata.fallback_used = chain.travel_fallback();
            flexible.push(TimeBlock::new(
                format!("{}:{}:arrival", self.plan_id, chain.chain_id),
                self.plan_id,
                wait,
                ActivityType::Buffer,
                "Arrival buffer",
                metadata,
            ));
        }

        for phase in [&envelope.anchor, &envelope.travel_back] {
            let block = self.chain_block(
                chain,
                phase,
                phase.start_time,
                phase.end_time,
                phase.envelope_phase(),
                LocationState::NotHome,
            );
            fixed.push(block.with_flags(true, true));
        }

        flexible.push(self.chain_block(
            chain,
            &envelope.recovery,
            envelope.recovery.start_time,
            envelope.recovery.end_time,
            Some(EnvelopePhase::Recovery),
            LocationState::AtHome,
        ));

        (fixed, flexible)
    }

    fn chain_block(
        &self,
        chain: &ExecutionChain,
        step: &ChainStepInstance,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        phase: Option<EnvelopePhase>,
        location_state: LocationState,
    ) -> TimeBlock {
        let activity_type = match step.role {
            StepRole::Anchor => ActivityType::Commitment,
            StepRole::ChainStep | StepRole::ExitGate => ActivityType::Routine,
            StepRole::Recovery => ActivityType::Buffer,
        };
        let mut metadata = BlockMetadata::new(BlockSource::Chain, location_state);
        metadata.chain_id = Some(chain.chain_id.clone());
        metadata.step_id = Some(step.step_id.clone());
        metadata.anchor_id = Some(chain.anchor_id.clone());
        metadata.phase = phase;
        metadata.fallback_used = step.fallback_used();
        metadata.template_fallback = chain.template_fallback();

        let mut block = TimeBlock::new(
            format!("{}:{}", self.plan_id, step.step_id),
            self.plan_id,
            Interval { start, end },
            activity_type,
            step.name.clone(),
            metadata,
        );
        block.is_required = step.is_required;
        block
    }

    /// Complement of the not-home spans within the day.
    fn home_intervals(&self) -> Vec<Interval> {
        TimeGapDetector::new().find_gaps(&merge(&self.not_home), self.day)
    }

    fn add_wake_ramp(&mut self, wake: DateTime<Utc>, minutes: i64) {
        let Some(ramp) = offset_minutes(wake, minutes)
            .ok()
            .and_then(|end| Interval::new(wake, end))
        else {
            return;
        };
        let block = TimeBlock::new(
            format!("{}:wake-ramp", self.plan_id),
            self.plan_id,
            ramp,
            ActivityType::Routine,
            "Wake ramp",
            BlockMetadata::new(BlockSource::WakeRamp, LocationState::AtHome),
        );
        self.place_flexible(block);
    }

    fn add_meal(&mut self, meal: &MealWindow, slot: Interval) {
        let id = format!("{}:meal-{}", self.plan_id, meal.name.to_lowercase().replace(' ', "-"));
        self.push(TimeBlock::new(
            id,
            self.plan_id,
            slot,
            ActivityType::Meal,
            meal.name.clone(),
            BlockMetadata::new(BlockSource::Meal, LocationState::AtHome),
        ));
    }

    fn add_routine(&mut self, index: usize, routine: &RoutineTemplate, input: &PlanInput, home: &[Interval]) {
        let preferred = match meals::time_on(input.date, &routine.preferred_start, &routine.name) {
            Ok(at) => at,
            Err(err) => {
                tracing::warn!(routine = %routine.name, error = %err, "skipping routine with invalid start");
                return;
            }
        };
        let Some(window) = Interval::new(preferred.max(self.day.start), self.day.end) else {
            tracing::debug!(routine = %routine.name, "routine starts after the day ends");
            return;
        };
        let candidates: Vec<Interval> = home.iter().filter_map(|h| h.intersect(&window)).collect();
        match self.occupancy.first_fit_in(&candidates, routine.duration_minutes) {
            Some(slot) => {
                let block = TimeBlock::new(
                    format!("{}:routine-{index}", self.plan_id),
                    self.plan_id,
                    slot,
                    ActivityType::Routine,
                    routine.name.clone(),
                    BlockMetadata::new(BlockSource::Routine, LocationState::AtHome),
                )
                .with_flags(false, routine.is_required);
                self.push(block);
            }
            None => tracing::debug!(routine = %routine.name, "no room for routine"),
        }
    }

    /// Place tasks by priority (highest first). Returns the ids that did
    /// not fit.
    fn add_tasks(&mut self, input: &PlanInput, home: &[Interval]) -> Vec<String> {
        let mut tasks: Vec<_> = input.tasks.iter().collect();
        tasks.sort_by(|a, b| b.effective_priority().cmp(&a.effective_priority()));

        let mut unscheduled = Vec::new();
        for task in tasks {
            match self.occupancy.first_fit_in(home, task.duration_minutes) {
                Some(slot) => {
                    let mut metadata = BlockMetadata::new(BlockSource::Task, LocationState::AtHome);
                    metadata.task_id = Some(task.id.clone());
                    let block = TimeBlock::new(
                        format!("{}:task-{}", self.plan_id, task.id),
                        self.plan_id,
                        slot,
                        ActivityType::Task,
                        task.title.clone(),
                        metadata,
                    )
                    .with_flags(false, task.is_required);
                    self.push(block);
                }
                None => {
                    tracing::debug!(task_id = %task.id, minutes = task.duration_minutes, "task does not fit");
                    unscheduled.push(task.id.clone());
                }
            }
        }
        unscheduled
    }

    fn fill_buffers(&mut self) {
        let occupied: Vec<Interval> = self.blocks.iter().map(TimeBlock::interval).collect();
        let fillers = filler_blocks(self.plan_id, &occupied, self.day, &self.not_home);
        for block in fillers {
            self.push(block);
        }
    }
}
