//! 路由上下文：当前逻辑执行的活动 RunId + 可选的惰性激活钩子
//!
//! 活动 Run 有两个来源，按优先级：
//! 1. `RoutingContext::scope` 绑定在某个 future 上的 RunId（规划循环为每个智能体设置），
//!    只在该 future 内可见，同一上下文上并发的编排互不干扰
//! 2. 显式创建、可 clone 的句柄中的共享槽位，由请求级 Run / track 设置与清除
//!
//! 装饰过的工具与模型客户端在每次调用时读取 `current`。

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::core::DurableError;
use crate::memory::{Message, Role};
use crate::run::call::{CallKind, Operation};
use crate::run::ids::RunId;

/// 惰性启动 Run 时附带的元数据（用于工作流日志与观测）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunMetadata {
    /// 触发激活的操作名
    pub trigger: String,
    pub user_message: Option<String>,
    pub system_message: Option<String>,
}

impl RunMetadata {
    /// 模型调用从消息列表中取最后一条 user 消息与第一条 system 消息
    pub fn from_operation(op: &Operation) -> Self {
        let mut metadata = Self {
            trigger: op.name.clone(),
            ..Self::default()
        };
        if op.kind == CallKind::ModelCall {
            if let Ok(messages) = serde_json::from_value::<Vec<Message>>(op.args.clone()) {
                metadata.user_message = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone());
                metadata.system_message = messages
                    .iter()
                    .find(|m| m.role == Role::System)
                    .map(|m| m.content.clone());
            }
        }
        metadata
    }
}

/// 惰性激活钩子：没有活动 Run 的首次调用“打开”一个 Run
#[async_trait]
pub trait RunActivator: Send + Sync {
    async fn activate(
        &self,
        ctx: &RoutingContext,
        metadata: RunMetadata,
    ) -> Result<RunId, DurableError>;
}

tokio::task_local! {
    static SCOPED_RUN: RunId;
}

#[derive(Clone, Default)]
pub struct RoutingContext {
    active: Arc<Mutex<Option<RunId>>>,
    activator: Option<Arc<dyn RunActivator>>,
}

impl RoutingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_activator(activator: Arc<dyn RunActivator>) -> Self {
        Self {
            active: Arc::default(),
            activator: Some(activator),
        }
    }

    /// 在 fut 内以 run_id 作为活动 Run；fut 内 spawn 出去的任务看不到
    pub async fn scope<F: Future>(run_id: RunId, fut: F) -> F::Output {
        SCOPED_RUN.scope(run_id, fut).await
    }

    /// 当前 future 绑定的 RunId（不看共享槽位）
    pub fn scoped() -> Option<RunId> {
        SCOPED_RUN.try_with(RunId::clone).ok()
    }

    pub fn current(&self) -> Option<RunId> {
        Self::scoped().or_else(|| self.lock().clone())
    }

    pub fn set(&self, run_id: RunId) {
        *self.lock() = Some(run_id);
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn activator(&self) -> Option<Arc<dyn RunActivator>> {
        self.activator.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<RunId>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for RoutingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingContext")
            .field("active", &self.current())
            .field("activator", &self.activator.is_some())
            .finish()
    }
}
