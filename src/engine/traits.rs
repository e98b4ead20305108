//! 持久化工作流引擎接口
//!
//! 会合协议只依赖引擎的四种能力：调度新实例、向运行中的实例投递事件、在工作流内等待外部事件、
//! 在工作流内调度并等待 Activity；另可发布自定义状态用于观测。

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{DurableError, EngineError};

/// 引擎客户端：从进程内（智能体线程、Activity）驱动工作流实例
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// 以 instance_id 调度一个新的工作流实例（异步启动）
    async fn schedule_new_workflow(
        &self,
        workflow: &str,
        input: Value,
        instance_id: &str,
    ) -> Result<(), EngineError>;

    /// 向运行中的实例投递命名事件
    async fn raise_event(
        &self,
        instance_id: &str,
        event_name: &str,
        payload: Value,
    ) -> Result<(), EngineError>;
}

/// 工作流执行上下文（每个实例单消费点、协作式执行）
#[async_trait]
pub trait WorkflowContext: Send + Sync {
    fn instance_id(&self) -> &str;

    fn input(&self) -> &Value;

    /// 挂起直到收到指定名称的外部事件
    async fn wait_for_external_event(&self, event_name: &str) -> Result<Value, EngineError>;

    /// 调度 Activity 并等待其持久化结果
    async fn call_activity(&self, activity: &str, input: Value) -> Result<Value, EngineError>;

    /// 发布自定义状态快照
    fn set_custom_status(&self, status: Value);
}

/// 工作流定义
#[async_trait]
pub trait Workflow: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &dyn WorkflowContext) -> Result<Value, DurableError>;
}

/// 一次 Activity 尝试（number 从 1 开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityAttempt {
    pub number: u32,
    pub max_attempts: u32,
}

impl ActivityAttempt {
    /// 不会被重试的单次尝试
    pub fn single() -> Self {
        Self {
            number: 1,
            max_attempts: 1,
        }
    }

    /// 失败后引擎不会再重试
    pub fn is_final(&self) -> bool {
        self.number >= self.max_attempts
    }
}

/// Activity 定义：失败时由 DurableError::is_retryable 决定引擎是否重试
#[async_trait]
pub trait WorkflowActivity: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, input: Value) -> Result<Value, DurableError>;

    /// 引擎按尝试调用；默认忽略尝试信息
    async fn run_attempt(
        &self,
        input: Value,
        attempt: ActivityAttempt,
    ) -> Result<Value, DurableError> {
        let _ = attempt;
        self.run(input).await
    }
}
