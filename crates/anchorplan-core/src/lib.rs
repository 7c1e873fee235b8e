//! # Anchorplan Core Library
//!
//! Core planning logic for anchorplan: turns the day's fixed commitments
//! (anchors) into executable preparation chains and a full daily plan.
//! The `anchorplan` CLI binary is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Chains**: template registry plus a generator that back-schedules
//!   preparation steps from each anchor's departure time
//! - **Travel**: estimator contract with a logged fallback duration
//! - **Context**: optional per-day enhancement (suggestions, medication
//!   step, duration priors, risk multiplier)
//! - **Plan**: merges chains, meals, routines and tasks into non-overlapping
//!   time blocks, and degrades plans that run behind
//! - **Sequencer**: runtime `pending -> completed | skipped` transitions
//! - **Storage**: TOML configuration under `~/.config/anchorplan/`
//!
//! ## Key Components
//!
//! - [`ChainGenerator`]: one anchor to one execution chain
//! - [`ContextIntegrator`]: applies a daily context to a chain
//! - [`PlanBuilder`]: async orchestration of a whole day
//! - [`Sequencer`]: block progression at runtime
//! - [`Config`]: application configuration management

pub mod anchor;
pub mod chain;
pub mod clock;
pub mod context;
pub mod error;
pub mod plan;
pub mod sequencer;
pub mod status;
pub mod storage;
pub mod travel;

pub use anchor::{Anchor, AnchorSource, AnchorType, StaticAnchorSource};
pub use chain::{
    ChainGenerator, ChainSettings, ChainStatus, ChainStepInstance, ChainTemplate, CommitmentEnvelope,
    ExecutionChain, TemplateRegistry,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{
    ContextEnhancementInfo, ContextIntegrator, ContextSettings, DailyContext, DailyContextProvider,
    DailyContextState, StaticContextProvider,
};
pub use error::{
    AnchorSourceError, ChainError, ConfigError, ContextError, CoreError, PlanError, StoreError,
    TransitionError, TravelError, ValidationError,
};
pub use plan::{
    degrade_plan, ActivityType, DailyPlan, DegradeSummary, EnergyState, GeneratedPlan,
    InMemoryPlanStore, LocationState, PlanBuilder, PlanInput, PlanStatus, PlanStore, PlannedTask,
    TimeBlock,
};
pub use sequencer::{Progress, Sequencer};
pub use status::ExecutionStatus;
pub use storage::Config;
pub use travel::{FixedTravelEstimator, TravelEstimator, TravelRequest, TravelRoute, TravelSettings};
