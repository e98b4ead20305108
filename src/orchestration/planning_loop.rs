//! 进程内规划循环
//!
//! 消费 first_action / next_action：每个批次的智能体并发执行，每结束一个智能体调用一次 next_action。
//! 每个智能体的 future 都绑定它自己的 RunId（RoutingContext::scope），其调用只会落在该 Run 中。
//! 智能体失败时放弃规划器，返回该智能体的错误。

use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{error, info};

use crate::core::{AgentError, DurableError};
use crate::orchestration::planner::{Action, OrchestrationPlanner, ScheduledAgent};
use crate::run::RoutingContext;

pub async fn run_planning_loop(planner: Arc<OrchestrationPlanner>) -> Result<(), AgentError> {
    let planner_id = planner.planner_id().to_string();
    let scope = planner.scope().clone();
    let mut running = FuturesUnordered::new();
    let mut action = planner.first_action().await?;

    loop {
        match action {
            Action::Done { failure: None } => {
                info!(planner_id = %planner_id, "planning loop finished");
                return Ok(());
            }
            Action::Done {
                failure: Some(message),
            } => {
                error!(planner_id = %planner_id, error = %message, "orchestration failed");
                return Err(DurableError::OrchestrationFailed {
                    planner_id,
                    message,
                }
                .into());
            }
            Action::Call(batch) => {
                for ScheduledAgent { agent, run_id } in batch {
                    let scope = scope.clone();
                    running.push(RoutingContext::scope(run_id, async move {
                        let result = agent.invoke(&scope).await;
                        (agent, result)
                    }));
                }
            }
            Action::NoOp => {}
        }

        let Some((agent, result)) = running.next().await else {
            planner.abort().await;
            return Err(DurableError::OrchestrationFailed {
                planner_id,
                message: "planning loop has no running agent to wait for".to_string(),
            }
            .into());
        };
        if let Err(e) = result {
            error!(planner_id = %planner_id, agent = %agent.name(), error = %e, "agent failed");
            planner.abort().await;
            return Err(e);
        }
        info!(planner_id = %planner_id, agent = %agent.name(), "agent finished");
        action = planner.next_action().await;
    }
}
