//! 多智能体编排：锁步规划器 + 外部编排工作流
//!
//! 编排工作流（sequence / parallel / loop / conditional）在引擎里逐步调度 ExecutionActivity，
//! 进程内规划循环通过 OrchestrationPlanner 与之锁步，真正执行每个智能体。

pub mod activities;
pub mod agent;
pub mod builder;
pub mod planner;
pub mod planning_loop;
pub mod registry;
pub mod scope;
pub mod types;
pub mod workflows;

pub use activities::{
    ConditionCheckActivity, ExecutionActivity, ExitConditionCheckActivity,
    OrchestrationCompleteActivity,
};
pub use agent::Agent;
pub use builder::{Orchestration, OrchestrationBuilder};
pub use planner::{Action, AgentTurn, OrchestrationPlanner, ScheduledAgent};
pub use planning_loop::run_planning_loop;
pub use registry::PlannerRegistry;
pub use scope::{AgentCondition, AgentScope, ExitCondition};
pub use types::{OrchestrationError, OrchestrationInput, Topology};
pub use workflows::OrchestrationWorkflow;
