//! 锁步编排规划器
//!
//! 外部编排工作流（通过 ExecutionActivity）用 execute_agent 把智能体放进交换队列并等待其轮次结束；
//! 进程内规划循环消费 first_action / next_action：
//! - next_action 先完成上一个智能体的轮次（解除对应 Activity 的阻塞）
//! - 当前并行批次还有未结束的成员时返回 NoOp
//! - 否则阻塞到至少一个交换到达，再把队列中已有的交换一次取完作为一个批次（并行扇出由此实现）
//! - 批次中的每个智能体都带着自己的 RunId，由规划循环绑定到该智能体的 future 上
//! - 结束哨兵到达时清理（清除上下文、注销规划器）并返回 Done

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::core::DurableError;
use crate::engine::WorkflowClient;
use crate::orchestration::agent::Agent;
use crate::orchestration::builder::Orchestration;
use crate::orchestration::registry::PlannerRegistry;
use crate::orchestration::scope::{AgentCondition, AgentScope, ExitCondition};
use crate::orchestration::types::{OrchestrationInput, Topology};
use crate::run::RunId;

/// 规划循环的下一步
pub enum Action {
    /// 执行一个批次（单个为顺序，多个为并行）
    Call(Vec<ScheduledAgent>),
    /// 当前批次仍有智能体在执行
    NoOp,
    /// 编排结束；failure 为编排工作流报告的失败
    Done { failure: Option<String> },
}

/// 批次中的一个智能体及其调用应归属的 Run
#[derive(Clone)]
pub struct ScheduledAgent {
    pub agent: Arc<dyn Agent>,
    pub run_id: RunId,
}

enum Exchange {
    Agent {
        agent: Arc<dyn Agent>,
        run_id: RunId,
        turn: oneshot::Sender<()>,
    },
    Finished {
        failure: Option<String>,
    },
}

struct Lockstep {
    rx: mpsc::UnboundedReceiver<Exchange>,
    parallel_agents: i64,
    pending: VecDeque<oneshot::Sender<()>>,
    last: Option<oneshot::Sender<()>>,
}

/// 提交者持有的轮次句柄：规划器对该智能体调用 next_action 后完成
pub struct AgentTurn {
    planner_id: String,
    rx: oneshot::Receiver<()>,
}

impl AgentTurn {
    pub async fn wait(self) -> Result<(), DurableError> {
        self.rx
            .await
            .map_err(|_| DurableError::PlannerClosed(self.planner_id))
    }
}

pub struct OrchestrationPlanner {
    planner_id: String,
    name: String,
    topology: Topology,
    agents: Vec<Arc<dyn Agent>>,
    max_iterations: u32,
    test_exit_at_loop_end: bool,
    exit_condition: Option<ExitCondition>,
    conditions: HashMap<usize, AgentCondition>,
    scope: AgentScope,
    client: Arc<dyn WorkflowClient>,
    planners: Arc<PlannerRegistry>,
    exchange: mpsc::UnboundedSender<Exchange>,
    lockstep: AsyncMutex<Lockstep>,
}

impl OrchestrationPlanner {
    pub fn new(
        orchestration: &Orchestration,
        scope: AgentScope,
        client: Arc<dyn WorkflowClient>,
        planners: Arc<PlannerRegistry>,
    ) -> Arc<Self> {
        let (exchange, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            planner_id: uuid::Uuid::new_v4().to_string(),
            name: orchestration.name.clone(),
            topology: orchestration.topology,
            agents: orchestration.agents.clone(),
            max_iterations: orchestration.max_iterations,
            test_exit_at_loop_end: orchestration.test_exit_at_loop_end,
            exit_condition: orchestration.exit_condition.clone(),
            conditions: orchestration.conditions.clone(),
            scope,
            client,
            planners,
            exchange,
            lockstep: AsyncMutex::new(Lockstep {
                rx,
                parallel_agents: 0,
                pending: VecDeque::new(),
                last: None,
            }),
        })
    }

    pub fn planner_id(&self) -> &str {
        &self.planner_id
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn scope(&self) -> &AgentScope {
        &self.scope
    }

    pub fn agent(&self, index: usize) -> Result<Arc<dyn Agent>, DurableError> {
        self.agents
            .get(index)
            .cloned()
            .ok_or_else(|| DurableError::AgentIndexOutOfRange {
                planner_id: self.planner_id.clone(),
                index,
                count: self.agents.len(),
            })
    }

    /// 提交智能体并返回其轮次句柄
    pub fn execute_agent(
        &self,
        agent: Arc<dyn Agent>,
        run_id: RunId,
    ) -> Result<AgentTurn, DurableError> {
        let (turn, rx) = oneshot::channel();
        debug!(planner_id = %self.planner_id, agent = %agent.name(), run_id = %run_id, "agent submitted");
        self.exchange
            .send(Exchange::Agent { agent, run_id, turn })
            .map_err(|_| DurableError::PlannerClosed(self.planner_id.clone()))?;
        Ok(AgentTurn {
            planner_id: self.planner_id.clone(),
            rx,
        })
    }

    /// 投递结束哨兵
    pub fn signal_workflow_complete(&self, failure: Option<String>) -> Result<(), DurableError> {
        self.exchange
            .send(Exchange::Finished { failure })
            .map_err(|_| DurableError::PlannerClosed(self.planner_id.clone()))
    }

    /// loop 退出条件；未配置则不退出
    pub fn check_exit_condition(&self, iteration: u32) -> bool {
        match &self.exit_condition {
            Some(condition) => condition(&self.scope, iteration),
            None => false,
        }
    }

    /// conditional 执行条件；未配置则总是执行
    pub fn check_condition(&self, agent_index: usize) -> bool {
        match self.conditions.get(&agent_index) {
            Some(condition) => condition(&self.scope),
            None => true,
        }
    }

    /// 调度编排工作流（实例 id 即 planner_id），然后取第一个批次
    pub async fn first_action(&self) -> Result<Action, DurableError> {
        let input = OrchestrationInput {
            planner_id: self.planner_id.clone(),
            agent_count: self.agents.len(),
            max_iterations: self.max_iterations,
            test_exit_at_loop_end: self.test_exit_at_loop_end,
        };
        let payload = serde_json::to_value(&input)?;
        if let Err(e) = self
            .client
            .schedule_new_workflow(self.topology.workflow_name(), payload, &self.planner_id)
            .await
        {
            self.cleanup();
            return Err(e.into());
        }
        info!(
            planner_id = %self.planner_id,
            orchestration = %self.name,
            topology = ?self.topology,
            agents = self.agents.len(),
            "orchestration workflow scheduled"
        );
        let mut state = self.lockstep.lock().await;
        Ok(self.step(&mut state).await)
    }

    /// 上一个智能体已结束：完成其轮次并计算下一步
    pub async fn next_action(&self) -> Action {
        let mut state = self.lockstep.lock().await;
        if let Some(turn) = state.last.take() {
            if turn.send(()).is_err() {
                debug!(planner_id = %self.planner_id, "agent turn no longer awaited");
            }
            state.last = state.pending.pop_front();
        }
        self.step(&mut state).await
    }

    /// 放弃编排：丢弃未完成的轮次（提交者收到 PlannerClosed）并拒绝新的提交
    pub async fn abort(&self) {
        warn!(planner_id = %self.planner_id, "orchestration aborted");
        let mut state = self.lockstep.lock().await;
        state.last = None;
        state.pending.clear();
        Self::close(&mut state);
        self.cleanup();
    }

    async fn step(&self, state: &mut Lockstep) -> Action {
        state.parallel_agents -= 1;
        if state.parallel_agents > 0 {
            return Action::NoOp;
        }

        let Some(first) = state.rx.recv().await else {
            self.cleanup();
            return Action::Done {
                failure: Some(format!("planner {} exchange closed", self.planner_id)),
            };
        };
        let mut exchanges = vec![first];
        while let Ok(next) = state.rx.try_recv() {
            exchanges.push(next);
        }

        let mut batch = Vec::with_capacity(exchanges.len());
        let mut turns = VecDeque::with_capacity(exchanges.len());
        for exchange in exchanges {
            match exchange {
                Exchange::Finished { failure } => {
                    info!(planner_id = %self.planner_id, failed = failure.is_some(), "orchestration finished");
                    Self::close(state);
                    self.cleanup();
                    return Action::Done { failure };
                }
                Exchange::Agent { agent, run_id, turn } => {
                    batch.push(ScheduledAgent { agent, run_id });
                    turns.push_back(turn);
                }
            }
        }

        state.parallel_agents = batch.len() as i64;
        state.pending = turns;
        state.last = state.pending.pop_front();

        debug!(planner_id = %self.planner_id, batch = batch.len(), "batch released");
        Action::Call(batch)
    }

    fn close(state: &mut Lockstep) {
        state.rx.close();
        while state.rx.try_recv().is_ok() {}
    }

    fn cleanup(&self) {
        self.planners.unregister(&self.planner_id);
    }
}
