//! 编排工作流：按拓扑驱动 ExecutionActivity
//!
//! - sequence：依次执行每个智能体
//! - parallel：同时调度全部智能体
//! - loop：最多 max_iterations 轮；默认每个智能体之后检查退出条件，testExitAtLoopEnd 时只在每轮末检查
//! - conditional：按顺序执行条件满足的智能体
//!
//! 无论成功与否都通过 OrchestrationCompleteActivity 投递结束哨兵（失败时附带错误信息），再返回结果。

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::core::DurableError;
use crate::engine::{Workflow, WorkflowContext};
use crate::orchestration::types::{
    ConditionCheckInput, ExecutionActivityInput, ExitConditionCheckInput, OrchestrationCompleteInput,
    OrchestrationInput, Topology, AGENT_EXECUTION_ACTIVITY, CONDITION_CHECK_ACTIVITY,
    EXIT_CONDITION_CHECK_ACTIVITY, ORCHESTRATION_COMPLETE_ACTIVITY,
};

pub struct OrchestrationWorkflow {
    topology: Topology,
}

impl OrchestrationWorkflow {
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }
}

#[async_trait]
impl Workflow for OrchestrationWorkflow {
    fn name(&self) -> &str {
        self.topology.workflow_name()
    }

    async fn run(&self, ctx: &dyn WorkflowContext) -> Result<Value, DurableError> {
        let input: OrchestrationInput = serde_json::from_value(ctx.input().clone())?;
        info!(
            planner_id = %input.planner_id,
            topology = ?self.topology,
            agents = input.agent_count,
            "orchestration workflow started"
        );

        let outcome = match self.topology {
            Topology::Sequence => run_sequence(ctx, &input).await,
            Topology::Parallel => run_parallel(ctx, &input).await,
            Topology::Loop => run_loop(ctx, &input).await,
            Topology::Conditional => run_conditional(ctx, &input).await,
        };

        let complete = OrchestrationCompleteInput {
            planner_id: input.planner_id.clone(),
            failure: outcome.as_ref().err().map(|e| e.to_string()),
        };
        let signalled = ctx
            .call_activity(ORCHESTRATION_COMPLETE_ACTIVITY, serde_json::to_value(&complete)?)
            .await;
        if let Err(e) = &signalled {
            warn!(planner_id = %input.planner_id, error = %e, "failed to signal orchestration completion");
        }

        let executed = outcome?;
        signalled?;
        info!(planner_id = %input.planner_id, executed, "orchestration workflow completed");
        Ok(json!({ "plannerId": input.planner_id, "executedSteps": executed }))
    }
}

async fn execute(
    ctx: &dyn WorkflowContext,
    planner_id: &str,
    agent_index: usize,
    iteration: u32,
) -> Result<(), DurableError> {
    let input = ExecutionActivityInput {
        planner_id: planner_id.to_string(),
        agent_index,
        iteration,
    };
    ctx.call_activity(AGENT_EXECUTION_ACTIVITY, serde_json::to_value(&input)?)
        .await?;
    Ok(())
}

async fn run_sequence(ctx: &dyn WorkflowContext, input: &OrchestrationInput) -> Result<usize, DurableError> {
    for index in 0..input.agent_count {
        execute(ctx, &input.planner_id, index, 0).await?;
    }
    Ok(input.agent_count)
}

async fn run_parallel(ctx: &dyn WorkflowContext, input: &OrchestrationInput) -> Result<usize, DurableError> {
    try_join_all((0..input.agent_count).map(|index| execute(ctx, &input.planner_id, index, 0))).await?;
    Ok(input.agent_count)
}

async fn run_loop(ctx: &dyn WorkflowContext, input: &OrchestrationInput) -> Result<usize, DurableError> {
    let mut executed = 0;
    for iteration in 0..input.max_iterations {
        for index in 0..input.agent_count {
            execute(ctx, &input.planner_id, index, iteration).await?;
            executed += 1;
            if !input.test_exit_at_loop_end && should_exit(ctx, input, iteration).await? {
                return Ok(executed);
            }
        }
        if input.test_exit_at_loop_end && should_exit(ctx, input, iteration).await? {
            return Ok(executed);
        }
    }
    Ok(executed)
}

async fn run_conditional(
    ctx: &dyn WorkflowContext,
    input: &OrchestrationInput,
) -> Result<usize, DurableError> {
    let mut executed = 0;
    for index in 0..input.agent_count {
        let check = ConditionCheckInput {
            planner_id: input.planner_id.clone(),
            agent_index: index,
        };
        let run = ctx
            .call_activity(CONDITION_CHECK_ACTIVITY, serde_json::to_value(&check)?)
            .await?;
        if run.as_bool().unwrap_or(false) {
            execute(ctx, &input.planner_id, index, 0).await?;
            executed += 1;
        }
    }
    Ok(executed)
}

async fn should_exit(
    ctx: &dyn WorkflowContext,
    input: &OrchestrationInput,
    iteration: u32,
) -> Result<bool, DurableError> {
    let check = ExitConditionCheckInput {
        planner_id: input.planner_id.clone(),
        iteration,
    };
    let exit = ctx
        .call_activity(EXIT_CONDITION_CHECK_ACTIVITY, serde_json::to_value(&check)?)
        .await?;
    Ok(exit.as_bool().unwrap_or(false))
}
