//! Run 注册表：RunId → 挂起调用表
//!
//! 由组合根显式创建并共享（Arc），不是进程级单例。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::run::ids::RunId;
use crate::run::pending::PendingCallTable;

#[derive(Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<RunId, Arc<PendingCallTable>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为 run_id 新建挂起调用表并登记（已存在则替换）
    pub fn register(&self, run_id: RunId) -> Arc<PendingCallTable> {
        let table = Arc::new(PendingCallTable::new(run_id.clone()));
        self.insert(table.clone());
        table
    }

    pub fn insert(&self, table: Arc<PendingCallTable>) {
        let run_id = table.run_id().clone();
        debug!(run_id = %run_id, "run registered");
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id, table);
    }

    pub fn get(&self, run_id: &RunId) -> Option<Arc<PendingCallTable>> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .cloned()
    }

    pub fn unregister(&self, run_id: &RunId) -> Option<Arc<PendingCallTable>> {
        let removed = self
            .runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(run_id);
        if removed.is_some() {
            debug!(run_id = %run_id, "run unregistered");
        }
        removed
    }

    pub fn contains(&self, run_id: &RunId) -> bool {
        self.get(run_id).is_some()
    }

    /// 已登记的 RunId（排序后，用于错误信息）
    pub fn registered_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .map(|id| id.to_string())
            .collect();
        ids.sort();
        ids
    }
}
