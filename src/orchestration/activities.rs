//! 编排 Activity
//!
//! - ExecutionActivity：每个编排步骤启动嵌套 RunWorkflow，把智能体交给规划器并阻塞到其轮次结束，
//!   无论成败都向嵌套 Run 发送 done 并注销
//! - ExitConditionCheckActivity / ConditionCheckActivity：在共享作用域上求值谓词
//! - OrchestrationCompleteActivity：向规划器投递结束哨兵

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::core::DurableError;
use crate::engine::WorkflowActivity;
use crate::orchestration::registry::PlannerRegistry;
use crate::orchestration::types::{
    ConditionCheckInput, ExecutionActivityInput, ExitConditionCheckInput, OrchestrationCompleteInput,
    AGENT_EXECUTION_ACTIVITY, CONDITION_CHECK_ACTIVITY, EXIT_CONDITION_CHECK_ACTIVITY,
    ORCHESTRATION_COMPLETE_ACTIVITY,
};
use crate::run::{AgentRunInput, RunId, RunLifecycle};

pub struct ExecutionActivity {
    planners: Arc<PlannerRegistry>,
    lifecycle: RunLifecycle,
}

impl ExecutionActivity {
    pub fn new(planners: Arc<PlannerRegistry>, lifecycle: RunLifecycle) -> Self {
        Self { planners, lifecycle }
    }
}

#[async_trait]
impl WorkflowActivity for ExecutionActivity {
    fn name(&self) -> &str {
        AGENT_EXECUTION_ACTIVITY
    }

    async fn run(&self, input: Value) -> Result<Value, DurableError> {
        let input: ExecutionActivityInput = serde_json::from_value(input)?;
        let planner = self.planners.require(&input.planner_id)?;
        let agent = planner.agent(input.agent_index)?;
        let agent_name = agent.name().to_string();
        let run_id = RunId::for_agent(&input.planner_id, input.agent_index, input.iteration);
        info!(
            planner_id = %input.planner_id,
            agent = %agent_name,
            run_id = %run_id,
            "agent execution started"
        );

        self.lifecycle
            .start_run_with_input(AgentRunInput {
                run_id: run_id.clone(),
                agent_name: agent_name.clone(),
                user_message: agent.user_message().map(str::to_string),
                system_message: agent.system_message().map(str::to_string),
            })
            .await?;

        let outcome = match planner.execute_agent(agent, run_id.clone()) {
            Ok(turn) => turn.wait().await,
            Err(e) => Err(e),
        };
        self.lifecycle.finish_run(&run_id).await;
        outcome?;

        info!(planner_id = %input.planner_id, agent = %agent_name, run_id = %run_id, "agent execution completed");
        Ok(json!({ "agentName": agent_name, "runId": run_id }))
    }
}

pub struct ExitConditionCheckActivity {
    planners: Arc<PlannerRegistry>,
}

impl ExitConditionCheckActivity {
    pub fn new(planners: Arc<PlannerRegistry>) -> Self {
        Self { planners }
    }
}

#[async_trait]
impl WorkflowActivity for ExitConditionCheckActivity {
    fn name(&self) -> &str {
        EXIT_CONDITION_CHECK_ACTIVITY
    }

    async fn run(&self, input: Value) -> Result<Value, DurableError> {
        let input: ExitConditionCheckInput = serde_json::from_value(input)?;
        let planner = self.planners.require(&input.planner_id)?;
        Ok(Value::Bool(planner.check_exit_condition(input.iteration)))
    }
}

pub struct ConditionCheckActivity {
    planners: Arc<PlannerRegistry>,
}

impl ConditionCheckActivity {
    pub fn new(planners: Arc<PlannerRegistry>) -> Self {
        Self { planners }
    }
}

#[async_trait]
impl WorkflowActivity for ConditionCheckActivity {
    fn name(&self) -> &str {
        CONDITION_CHECK_ACTIVITY
    }

    async fn run(&self, input: Value) -> Result<Value, DurableError> {
        let input: ConditionCheckInput = serde_json::from_value(input)?;
        let planner = self.planners.require(&input.planner_id)?;
        Ok(Value::Bool(planner.check_condition(input.agent_index)))
    }
}

pub struct OrchestrationCompleteActivity {
    planners: Arc<PlannerRegistry>,
}

impl OrchestrationCompleteActivity {
    pub fn new(planners: Arc<PlannerRegistry>) -> Self {
        Self { planners }
    }
}

#[async_trait]
impl WorkflowActivity for OrchestrationCompleteActivity {
    fn name(&self) -> &str {
        ORCHESTRATION_COMPLETE_ACTIVITY
    }

    async fn run(&self, input: Value) -> Result<Value, DurableError> {
        let input: OrchestrationCompleteInput = serde_json::from_value(input)?;
        let planner = self.planners.require(&input.planner_id)?;
        planner.signal_workflow_complete(input.failure)?;
        Ok(Value::Null)
    }
}
