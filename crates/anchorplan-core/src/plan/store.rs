//! Plan persistence collaborator.

use std::collections::HashMap;
use std::sync::Mutex;

use super::DailyPlan;
use crate::error::StoreError;

/// Loads and saves plans by id.
pub trait PlanStore: Send + Sync {
    fn load(&self, plan_id: &str) -> Result<Option<DailyPlan>, StoreError>;
    fn save(&self, plan: &DailyPlan) -> Result<(), StoreError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryPlanStore {
    plans: Mutex<HashMap<String, DailyPlan>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.plans.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PlanStore for InMemoryPlanStore {
    fn load(&self, plan_id: &str) -> Result<Option<DailyPlan>, StoreError> {
        let plans = self
            .plans
            .lock()
            .map_err(|e| StoreError::Backend(format!("plan store lock poisoned: {e}")))?;
        Ok(plans.get(plan_id).cloned())
    }

    fn save(&self, plan: &DailyPlan) -> Result<(), StoreError> {
        let mut plans = self
            .plans
            .lock()
            .map_err(|e| StoreError::Backend(format!("plan store lock poisoned: {e}")))?;
        plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }
}
