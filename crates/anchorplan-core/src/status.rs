//! Execution status shared by chain steps and plan blocks.
//!
//! ```text
//! Pending ──> Completed
//!    │
//!    └──────> Skipped
//! ```
//!
//! Both terminal states are final.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Completed,
    Skipped,
}

impl ExecutionStatus {
    /// Check if a transition is valid.
    pub fn can_transition_to(&self, to: &ExecutionStatus) -> bool {
        match self {
            ExecutionStatus::Pending => {
                matches!(to, ExecutionStatus::Completed | ExecutionStatus::Skipped)
            }
            ExecutionStatus::Completed | ExecutionStatus::Skipped => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Skipped => "skipped",
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ExecutionStatus::Pending => 0,
            ExecutionStatus::Completed => 1,
            ExecutionStatus::Skipped => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ExecutionStatus::Completed,
            2 => ExecutionStatus::Skipped,
            _ => ExecutionStatus::Pending,
        }
    }
}
