//! 规划器注册表：plannerId → 规划器，供编排 Activity 查找

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::core::DurableError;
use crate::orchestration::planner::OrchestrationPlanner;

#[derive(Default)]
pub struct PlannerRegistry {
    planners: RwLock<HashMap<String, Arc<OrchestrationPlanner>>>,
}

impl PlannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, planner: Arc<OrchestrationPlanner>) {
        let id = planner.planner_id().to_string();
        debug!(planner_id = %id, "planner registered");
        self.planners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, planner);
    }

    pub fn get(&self, planner_id: &str) -> Option<Arc<OrchestrationPlanner>> {
        self.planners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(planner_id)
            .cloned()
    }

    /// 查找规划器；缺失是致命错误（附带已登记的 id）
    pub fn require(&self, planner_id: &str) -> Result<Arc<OrchestrationPlanner>, DurableError> {
        self.get(planner_id)
            .ok_or_else(|| DurableError::PlannerNotFound {
                planner_id: planner_id.to_string(),
                registered: self.registered_ids(),
            })
    }

    pub fn unregister(&self, planner_id: &str) -> Option<Arc<OrchestrationPlanner>> {
        let removed = self
            .planners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(planner_id);
        if removed.is_some() {
            debug!(planner_id = %planner_id, "planner unregistered");
        }
        removed
    }

    pub fn registered_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .planners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
