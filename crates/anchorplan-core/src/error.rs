//! Core error types for anchorplan-core.
//!
//! Collaborator errors (`TravelError`, `ContextError`) are recovered locally
//! through documented fallbacks and only ever reach callers as metadata.
//! `ChainError` is isolated per anchor. `PlanError` and `TransitionError`
//! are the errors callers actually see.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

use crate::status::ExecutionStatus;

/// Core error type for anchorplan-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Chain generation errors
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Plan build / degrade errors
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Illegal block or step transitions
    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while generating one anchor's chain.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// Anchor has an empty or inverted time range
    #[error("Anchor '{anchor_id}' has invalid time range {start} .. {end}")]
    InvalidAnchor {
        anchor_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Template resolved for the anchor has no steps
    #[error("Template '{template}' has no steps")]
    EmptyTemplate { template: String },

    /// Chain times fall outside the representable range
    #[error("Chain schedule invalid: {0}")]
    Schedule(#[from] ValidationError),

    /// Pipeline for this anchor panicked
    #[error("Chain pipeline for anchor '{anchor_id}' panicked: {message}")]
    Panicked { anchor_id: String, message: String },
}

/// Travel estimator failures. Always recovered with the default duration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TravelError {
    /// Estimator could not produce a route
    #[error("Travel estimator unavailable: {0}")]
    Unavailable(String),

    /// Estimator returned a zero or negative duration
    #[error("Travel estimator returned non-positive duration ({minutes} min)")]
    NonPositiveDuration { minutes: i64 },

    /// Estimator returned a duration longer than any single trip
    #[error("Travel estimator returned {minutes} min, more than the {max} min limit")]
    DurationTooLong { minutes: i64, max: i64 },

    /// Estimator did not answer in time
    #[error("Travel estimator timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

/// Daily context failures. A fetch failure means "no enhancement".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    /// Provider could not supply a context
    #[error("Daily context unavailable: {0}")]
    Unavailable(String),

    /// Provider did not answer in time
    #[error("Daily context provider timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Historical prior cannot be applied
    #[error("Invalid duration prior for '{step}': {minutes} min")]
    InvalidPrior { step: String, minutes: i64 },

    /// Enhanced chain would finish too late to travel and arrive on time
    #[error("Enhanced chain ends at {finishes}, after the latest departure {latest}")]
    MissesDeparture {
        finishes: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    /// A sub-step produced a schedule that breaks chain invariants
    #[error("Context enhancement rejected: {0}")]
    Rejected(#[from] ValidationError),
}

/// Calendar ingestion failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Anchor source '{source_name}' failed: {message}")]
pub struct AnchorSourceError {
    pub source_name: String,
    pub message: String,
}

/// Persistence collaborator failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend could not complete the operation
    #[error("Plan store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by plan generation and degradation.
#[derive(Error, Debug)]
pub enum PlanError {
    /// The assembled plan breaks a block invariant; nothing is returned
    #[error("Plan rejected: {0}")]
    Validation(#[from] ValidationError),

    /// Anchors for the date could not be fetched
    #[error(transparent)]
    AnchorSource(#[from] AnchorSourceError),

    /// Degrade was requested twice
    #[error("Plan '{plan_id}' is already degraded")]
    AlreadyDegraded { plan_id: String },

    /// No plan with that id in the store
    #[error("Plan '{plan_id}' not found")]
    NotFound { plan_id: String },

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A block changed state underneath the operation
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Attempt to move a step or block out of a terminal state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid transition for '{subject}': {from:?} -> {to:?}")]
pub struct TransitionError {
    pub subject: String,
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Dotted key does not exist
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Configuration directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end_time ({end}) must be greater than start_time ({start})")]
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Two active blocks share time
    #[error("Blocks '{first}' and '{second}' overlap")]
    OverlappingBlocks { first: String, second: String },

    /// Sequence order does not strictly increase
    #[error("Sequence order not strictly increasing at block '{block}' ({previous} -> {current})")]
    NonMonotonicSequence {
        block: String,
        previous: u32,
        current: u32,
    },

    /// Out of bounds
    #[error("Index {index} out of bounds for {collection} (length: {len})")]
    OutOfBounds {
        collection: String,
        index: usize,
        len: usize,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
