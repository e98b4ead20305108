//! 编排类型：拓扑、工作流 / Activity 名称与输入、构建错误

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SEQUENTIAL_WORKFLOW: &str = "sequential-orchestration-workflow";
pub const PARALLEL_WORKFLOW: &str = "parallel-orchestration-workflow";
pub const LOOP_WORKFLOW: &str = "loop-orchestration-workflow";
pub const CONDITIONAL_WORKFLOW: &str = "conditional-orchestration-workflow";

pub const AGENT_EXECUTION_ACTIVITY: &str = "agent-execution-activity";
pub const EXIT_CONDITION_CHECK_ACTIVITY: &str = "exit-condition-check-activity";
pub const CONDITION_CHECK_ACTIVITY: &str = "condition-check-activity";
pub const ORCHESTRATION_COMPLETE_ACTIVITY: &str = "orchestration-complete-activity";

/// 编排拓扑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    Sequence,
    Parallel,
    Loop,
    Conditional,
}

impl Topology {
    pub const ALL: [Topology; 4] = [
        Topology::Sequence,
        Topology::Parallel,
        Topology::Loop,
        Topology::Conditional,
    ];

    /// 驱动该拓扑的编排工作流名称
    pub fn workflow_name(&self) -> &'static str {
        match self {
            Topology::Sequence => SEQUENTIAL_WORKFLOW,
            Topology::Parallel => PARALLEL_WORKFLOW,
            Topology::Loop => LOOP_WORKFLOW,
            Topology::Conditional => CONDITIONAL_WORKFLOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationInput {
    pub planner_id: String,
    pub agent_count: usize,
    pub max_iterations: u32,
    pub test_exit_at_loop_end: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionActivityInput {
    pub planner_id: String,
    pub agent_index: usize,
    /// loop 轮次（0 起），用于派生不重复的 RunId
    #[serde(default)]
    pub iteration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitConditionCheckInput {
    pub planner_id: String,
    pub iteration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionCheckInput {
    pub planner_id: String,
    pub agent_index: usize,
}

/// 编排结束信号；failure 为步骤失败时的错误信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationCompleteInput {
    pub planner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// 编排构建错误
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("Orchestration {0} has no agents")]
    NoAgents(String),
    #[error("Invalid orchestration configuration: {0}")]
    InvalidConfiguration(String),
}
