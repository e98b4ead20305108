//! Run 生命周期：启动（先登记再调度工作流）、结束（发送 done 再注销）
//!
//! - RunLifecycle::track：把一次独立的智能体调用包在一个 Run 里
//! - RequestRun：请求级惰性 Run，首次被路由的调用才真正启动，只启动一次

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::core::DurableError;
use crate::engine::WorkflowClient;
use crate::run::context::{RoutingContext, RunActivator, RunMetadata};
use crate::run::ids::RunId;
use crate::run::registry::RunRegistry;
use crate::run::workflow::{AgentEvent, AgentRunInput, AGENT_EVENT, RUN_WORKFLOW};

#[derive(Clone)]
pub struct RunLifecycle {
    runs: Arc<RunRegistry>,
    client: Arc<dyn WorkflowClient>,
}

impl RunLifecycle {
    pub fn new(runs: Arc<RunRegistry>, client: Arc<dyn WorkflowClient>) -> Self {
        Self { runs, client }
    }

    /// 以新的 RunId 启动一个 Run
    pub async fn start_run(
        &self,
        agent_name: &str,
        metadata: RunMetadata,
    ) -> Result<RunId, DurableError> {
        let input = AgentRunInput {
            run_id: RunId::new(),
            agent_name: agent_name.to_string(),
            user_message: metadata.user_message,
            system_message: metadata.system_message,
        };
        let run_id = input.run_id.clone();
        self.start_run_with_input(input).await?;
        Ok(run_id)
    }

    /// 登记 Run 后再调度 RunWorkflow（实例 id 即 RunId）；调度失败则撤销登记
    pub async fn start_run_with_input(&self, input: AgentRunInput) -> Result<(), DurableError> {
        let run_id = input.run_id.clone();
        self.runs.register(run_id.clone());
        let payload = serde_json::to_value(&input)?;
        if let Err(e) = self
            .client
            .schedule_new_workflow(RUN_WORKFLOW, payload, run_id.as_str())
            .await
        {
            self.runs.unregister(&run_id);
            return Err(e.into());
        }
        info!(run_id = %run_id, agent = %input.agent_name, "run started");
        Ok(())
    }

    /// 发送 done 并注销；done 投递失败只记录告警
    pub async fn finish_run(&self, run_id: &RunId) {
        match serde_json::to_value(AgentEvent::done()) {
            Ok(done) => {
                if let Err(e) = self.client.raise_event(run_id.as_str(), AGENT_EVENT, done).await {
                    warn!(run_id = %run_id, error = %e, "failed to send done event");
                }
            }
            Err(e) => warn!(run_id = %run_id, error = %e, "failed to encode done event"),
        }
        self.runs.unregister(run_id);
        info!(run_id = %run_id, "run finished");
    }

    /// 在一个 Run 中执行一次智能体调用；已有活动 Run 时直接执行
    pub async fn track<F, Fut, T>(
        &self,
        ctx: &RoutingContext,
        agent_name: &str,
        invoke: F,
    ) -> Result<T, DurableError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if ctx.current().is_some() {
            return Ok(invoke().await);
        }
        let run_id = self.start_run(agent_name, RunMetadata::default()).await?;
        ctx.set(run_id.clone());
        let result = invoke().await;
        self.finish_run(&run_id).await;
        ctx.clear();
        Ok(result)
    }
}

/// 请求级 Run：没有活动 Run 时由首次调用惰性启动
pub struct RequestRun {
    lifecycle: RunLifecycle,
    agent_name: String,
    run: OnceCell<RunId>,
}

impl RequestRun {
    pub fn new(lifecycle: RunLifecycle, agent_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            lifecycle,
            agent_name: agent_name.into(),
            run: OnceCell::new(),
        })
    }

    /// 带本激活钩子的路由上下文
    pub fn routing_context(self: &Arc<Self>) -> RoutingContext {
        RoutingContext::with_activator(self.clone())
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.run.get().cloned()
    }

    /// 请求结束：若已激活则发送 done、注销，并清除上下文
    pub async fn close(&self, ctx: &RoutingContext) {
        if let Some(run_id) = self.run.get() {
            self.lifecycle.finish_run(run_id).await;
        }
        ctx.clear();
    }
}

#[async_trait]
impl RunActivator for RequestRun {
    async fn activate(
        &self,
        ctx: &RoutingContext,
        metadata: RunMetadata,
    ) -> Result<RunId, DurableError> {
        let run_id = self
            .run
            .get_or_try_init(|| self.lifecycle.start_run(&self.agent_name, metadata))
            .await?
            .clone();
        ctx.set(run_id.clone());
        Ok(run_id)
    }
}
