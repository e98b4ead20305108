//! RunId / CallId 标识

use std::fmt;

use serde::{Deserialize, Serialize};

/// 一次被追踪的执行（对应一个持久化工作流实例）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// 编排中某个智能体步骤的 RunId：首轮为 "{planner}:{index}"，loop 后续轮次追加 ":{iteration}"
    pub fn for_agent(planner_id: &str, agent_index: usize, iteration: u32) -> Self {
        if iteration == 0 {
            Self(format!("{}:{}", planner_id, agent_index))
        } else {
            Self(format!("{}:{}:{}", planner_id, agent_index, iteration))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// 一次被路由的调用（在所属 RunId 内唯一）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_run_ids() {
        assert_eq!(RunId::for_agent("p1", 2, 0).as_str(), "p1:2");
        assert_eq!(RunId::for_agent("p1", 2, 3).as_str(), "p1:2:3");
        assert_ne!(RunId::new(), RunId::new());
    }
}
