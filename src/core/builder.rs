//! 组合根：统一创建会合桥接所需的共享组件
//!
//! DurableServices 持有 RunRegistry、PlannerRegistry、CallRouter、RunLifecycle 与工作流客户端，
//! 并把 RunWorkflow、CallExecutionActivity 以及全部编排工作流 / Activity 注册到引擎上。

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::engine::{LocalWorkflowRuntime, Workflow, WorkflowActivity, WorkflowClient};
use crate::llm::{DurableLlmClient, LlmClient};
use crate::orchestration::{
    ConditionCheckActivity, ExecutionActivity, ExitConditionCheckActivity,
    OrchestrationBuilder, OrchestrationCompleteActivity, OrchestrationWorkflow, PlannerRegistry,
    Topology,
};
use crate::run::{
    CallExecutionActivity, CallRouter, RequestRun, RoutingContext, RunLifecycle, RunRegistry,
    RunWorkflow,
};
use crate::tools::ToolRegistry;

/// 请求级惰性 Run 使用的智能体名
pub const STANDALONE_AGENT: &str = "standalone";

pub struct DurableServices {
    config: AppConfig,
    runs: Arc<RunRegistry>,
    planners: Arc<PlannerRegistry>,
    client: Arc<dyn WorkflowClient>,
    router: Arc<CallRouter>,
    lifecycle: RunLifecycle,
}

impl DurableServices {
    /// 以任意引擎客户端创建；工作流与 Activity 需另行注册到该引擎（见 workflows / activities）
    pub fn new(config: &AppConfig, client: Arc<dyn WorkflowClient>) -> Self {
        let runs = Arc::new(RunRegistry::new());
        let router = Arc::new(CallRouter::with_config(
            runs.clone(),
            client.clone(),
            &config.routing,
        ));
        let lifecycle = RunLifecycle::new(runs.clone(), client.clone());
        Self {
            config: config.clone(),
            runs,
            planners: Arc::new(PlannerRegistry::new()),
            client,
            router,
            lifecycle,
        }
    }

    /// 创建进程内运行时并注册全部工作流与 Activity
    pub fn with_local_runtime(config: &AppConfig) -> (Self, LocalWorkflowRuntime) {
        let runtime = LocalWorkflowRuntime::from_config(&config.engine);
        let services = Self::new(config, Arc::new(runtime.clone()));
        services.register_with(&runtime);
        (services, runtime)
    }

    pub fn register_with(&self, runtime: &LocalWorkflowRuntime) {
        let workflows = self.workflows();
        let activities = self.activities();
        info!(
            workflows = workflows.len(),
            activities = activities.len(),
            "registering durable workflows"
        );
        for workflow in workflows {
            runtime.register_workflow(workflow);
        }
        for activity in activities {
            runtime.register_activity(activity);
        }
    }

    /// RunWorkflow + 四种编排工作流
    pub fn workflows(&self) -> Vec<Arc<dyn Workflow>> {
        let mut workflows: Vec<Arc<dyn Workflow>> =
            vec![Arc::new(RunWorkflow::new(self.config.routing.preview_chars))];
        for topology in Topology::ALL {
            workflows.push(Arc::new(OrchestrationWorkflow::new(topology)));
        }
        workflows
    }

    pub fn activities(&self) -> Vec<Arc<dyn WorkflowActivity>> {
        vec![
            Arc::new(CallExecutionActivity::new(self.runs.clone())),
            Arc::new(ExecutionActivity::new(
                self.planners.clone(),
                self.lifecycle.clone(),
            )),
            Arc::new(ExitConditionCheckActivity::new(self.planners.clone())),
            Arc::new(ConditionCheckActivity::new(self.planners.clone())),
            Arc::new(OrchestrationCompleteActivity::new(self.planners.clone())),
        ]
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn runs(&self) -> &Arc<RunRegistry> {
        &self.runs
    }

    pub fn planners(&self) -> &Arc<PlannerRegistry> {
        &self.planners
    }

    pub fn client(&self) -> Arc<dyn WorkflowClient> {
        self.client.clone()
    }

    pub fn router(&self) -> &Arc<CallRouter> {
        &self.router
    }

    pub fn lifecycle(&self) -> &RunLifecycle {
        &self.lifecycle
    }

    /// 请求级惰性 Run（首次被路由的调用才启动）
    pub fn request_run(&self) -> Arc<RequestRun> {
        RequestRun::new(self.lifecycle.clone(), STANDALONE_AGENT)
    }

    /// 把工具注册表装饰为经路由执行
    pub fn durable_tools(&self, tools: ToolRegistry, ctx: &RoutingContext) -> ToolRegistry {
        tools.into_durable(self.router.clone(), ctx)
    }

    pub fn durable_llm(&self, llm: Arc<dyn LlmClient>, ctx: &RoutingContext) -> Arc<dyn LlmClient> {
        Arc::new(DurableLlmClient::new(llm, self.router.clone(), ctx.clone()))
    }

    /// 以配置默认值起步的编排构建器
    pub fn orchestration(&self, name: impl Into<String>, topology: Topology) -> OrchestrationBuilder {
        OrchestrationBuilder::new(name, topology).with_config(&self.config.orchestration)
    }
}

/// 便捷函数：加载配置（失败时退回默认值）并创建带进程内运行时的组件
pub fn create_services(config_path: Option<PathBuf>) -> (DurableServices, LocalWorkflowRuntime) {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    DurableServices::with_local_runtime(&config)
}

/// 严格版本：配置错误直接返回
pub fn try_create_services(
    config_path: Option<PathBuf>,
) -> Result<(DurableServices, LocalWorkflowRuntime), AgentError> {
    let config = crate::config::load_config(config_path)
        .map_err(|e| AgentError::ConfigError(e.to_string()))?;
    Ok(DurableServices::with_local_runtime(&config))
}
