//! 进程内工作流运行时
//!
//! 每个实例是一个 tokio 任务，拥有独立的事件收件箱：实例开始等待前投递的事件会被缓存，
//! 名称不匹配的事件也先缓存，直到被请求。Activity 在独立任务上执行，可重试错误按固定退避重试。
//! 不做持久化与重放，供演示程序与集成测试使用。
//! 结束超过保留时长（engine.finished_retention_secs）的实例在调度新实例时被清理。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineSection;
use crate::core::{DurableError, EngineError};
use crate::engine::{ActivityAttempt, Workflow, WorkflowActivity, WorkflowClient, WorkflowContext};

/// 实例运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Running,
    Completed,
    Failed,
    /// 运行时关闭时被取消
    Terminated,
}

impl RuntimeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RuntimeStatus::Running)
    }
}

/// 实例状态快照（自定义状态 + 终态结果）
#[derive(Debug, Clone)]
pub struct InstanceState {
    pub instance_id: String,
    pub workflow: String,
    pub status: RuntimeStatus,
    pub custom_status: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl InstanceState {
    fn running(instance_id: &str, workflow: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            workflow: workflow.to_string(),
            status: RuntimeStatus::Running,
            custom_status: None,
            output: None,
            error: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
        }
    }
}

/// Activity 重试策略（仅对 is_retryable 的错误生效）
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&EngineSection::default())
    }
}

impl From<&EngineSection> for RetryPolicy {
    fn from(section: &EngineSection) -> Self {
        Self {
            max_attempts: section.activity_max_attempts.max(1),
            backoff: section.retry_backoff(),
        }
    }
}

struct RaisedEvent {
    name: String,
    payload: Value,
}

struct InstanceHandle {
    events: mpsc::UnboundedSender<RaisedEvent>,
    state: watch::Receiver<InstanceState>,
}

struct RuntimeInner {
    workflows: RwLock<HashMap<String, Arc<dyn Workflow>>>,
    activities: RwLock<HashMap<String, Arc<dyn WorkflowActivity>>>,
    instances: Mutex<HashMap<String, InstanceHandle>>,
    retry: RetryPolicy,
    retention: Duration,
    shutdown: CancellationToken,
}

/// 进程内运行时：可 clone，内部共享
#[derive(Clone)]
pub struct LocalWorkflowRuntime {
    inner: Arc<RuntimeInner>,
}

impl Default for LocalWorkflowRuntime {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl LocalWorkflowRuntime {
    pub fn new(retry: RetryPolicy) -> Self {
        Self::with_retention(retry, EngineSection::default().finished_retention())
    }

    /// retention：实例结束后保留多久（之后可被清理）
    pub fn with_retention(retry: RetryPolicy, retention: Duration) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                workflows: RwLock::new(HashMap::new()),
                activities: RwLock::new(HashMap::new()),
                instances: Mutex::new(HashMap::new()),
                retry,
                retention,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn from_config(section: &EngineSection) -> Self {
        Self::with_retention(RetryPolicy::from(section), section.finished_retention())
    }

    pub fn register_workflow(&self, workflow: Arc<dyn Workflow>) {
        let name = workflow.name().to_string();
        debug!(workflow = %name, "workflow registered");
        write(&self.inner.workflows).insert(name, workflow);
    }

    pub fn register_activity(&self, activity: Arc<dyn WorkflowActivity>) {
        let name = activity.name().to_string();
        debug!(activity = %name, "activity registered");
        write(&self.inner.activities).insert(name, activity);
    }

    /// 当前状态快照；未知实例返回 None
    pub fn instance_state(&self, instance_id: &str) -> Option<InstanceState> {
        lock(&self.inner.instances)
            .get(instance_id)
            .map(|h| h.state.borrow().clone())
    }

    /// 指定工作流的全部实例快照（按创建时间排序）
    pub fn instances_of(&self, workflow_name: &str) -> Vec<InstanceState> {
        let mut states: Vec<InstanceState> = lock(&self.inner.instances)
            .values()
            .map(|h| h.state.borrow().clone())
            .filter(|s| s.workflow == workflow_name)
            .collect();
        states.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        states
    }

    /// 等待实例进入终态（Completed / Failed / Terminated）
    pub async fn wait_for_completion(
        &self,
        instance_id: &str,
        timeout: Duration,
    ) -> Result<InstanceState, EngineError> {
        let mut rx = lock(&self.inner.instances)
            .get(instance_id)
            .map(|h| h.state.clone())
            .ok_or_else(|| EngineError::InstanceNotFound(instance_id.to_string()))?;

        // 先绑定结果，wait_for 的临时值不能比 rx 活得久
        let result = match tokio::time::timeout(timeout, rx.wait_for(|s| s.status.is_terminal())).await {
            Ok(Ok(state)) => Ok((*state).clone()),
            Ok(Err(_)) => Err(EngineError::InstanceNotRunning(instance_id.to_string())),
            Err(_) => Err(EngineError::WaitTimeout(instance_id.to_string())),
        };
        result
    }

    /// 移除结束超过 older_than 的实例，返回移除数量
    pub fn prune_finished(&self, older_than: Duration) -> usize {
        let cutoff = chrono::Utc::now().timestamp_millis()
            - i64::try_from(older_than.as_millis()).unwrap_or(i64::MAX);
        let mut instances = lock(&self.inner.instances);
        let before = instances.len();
        instances.retain(|_, h| match h.state.borrow().completed_at {
            Some(completed_at) => completed_at > cutoff,
            None => true,
        });
        let pruned = before - instances.len();
        if pruned > 0 {
            debug!(pruned, "finished workflow instances pruned");
        }
        pruned
    }

    /// 取消所有实例并清空注册表（同时断开 Activity 对运行时的引用环）
    pub fn shutdown(&self) {
        info!("workflow runtime shutting down");
        self.inner.shutdown.cancel();
        write(&self.inner.workflows).clear();
        write(&self.inner.activities).clear();
        lock(&self.inner.instances).clear();
    }

    fn start_instance(
        &self,
        workflow_name: &str,
        input: Value,
        instance_id: &str,
    ) -> Result<(), EngineError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::Shutdown);
        }
        self.prune_finished(self.inner.retention);
        let workflow = read(&self.inner.workflows)
            .get(workflow_name)
            .cloned()
            .ok_or_else(|| EngineError::WorkflowNotRegistered(workflow_name.to_string()))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(InstanceState::running(instance_id, workflow_name));
        {
            let mut instances = lock(&self.inner.instances);
            if let Some(existing) = instances.get(instance_id) {
                if !existing.state.borrow().status.is_terminal() {
                    return Err(EngineError::InstanceAlreadyRunning(instance_id.to_string()));
                }
            }
            instances.insert(
                instance_id.to_string(),
                InstanceHandle {
                    events: event_tx,
                    state: state_rx,
                },
            );
        }

        let ctx = LocalWorkflowContext {
            instance_id: instance_id.to_string(),
            input,
            inbox: AsyncMutex::new(Inbox {
                rx: event_rx,
                buffered: VecDeque::new(),
            }),
            runtime: self.clone(),
            state: state_tx,
        };
        let token = self.inner.shutdown.child_token();
        info!(instance_id = %instance_id, workflow = %workflow_name, "workflow instance scheduled");

        tokio::spawn(async move {
            let result = tokio::select! {
                result = workflow.run(&ctx) => Some(result),
                _ = token.cancelled() => None,
            };
            ctx.finish(result);
        });
        Ok(())
    }

    async fn run_activity(&self, activity_name: &str, input: Value) -> Result<Value, EngineError> {
        let activity = read(&self.inner.activities)
            .get(activity_name)
            .cloned()
            .ok_or_else(|| EngineError::ActivityNotRegistered(activity_name.to_string()))?;
        let retry = self.inner.retry.clone();
        let name = activity_name.to_string();

        let handle = tokio::spawn(async move {
            let mut attempt = 1;
            loop {
                let current = ActivityAttempt {
                    number: attempt,
                    max_attempts: retry.max_attempts,
                };
                match activity.run_attempt(input.clone(), current).await {
                    Ok(output) => return Ok(output),
                    Err(e) => {
                        let retryable = e.is_retryable();
                        if retryable && attempt < retry.max_attempts {
                            warn!(activity = %name, attempt, error = %e, "activity failed, retrying");
                            tokio::time::sleep(retry.backoff).await;
                            attempt += 1;
                            continue;
                        }
                        return Err(EngineError::ActivityFailed {
                            activity: name,
                            message: e.to_string(),
                            retryable,
                        });
                    }
                }
            }
        });

        match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(EngineError::ActivityFailed {
                activity: activity_name.to_string(),
                message: format!("activity task aborted: {join_err}"),
                retryable: false,
            }),
        }
    }
}

#[async_trait]
impl WorkflowClient for LocalWorkflowRuntime {
    async fn schedule_new_workflow(
        &self,
        workflow: &str,
        input: Value,
        instance_id: &str,
    ) -> Result<(), EngineError> {
        self.start_instance(workflow, input, instance_id)
    }

    async fn raise_event(
        &self,
        instance_id: &str,
        event_name: &str,
        payload: Value,
    ) -> Result<(), EngineError> {
        let instances = lock(&self.inner.instances);
        let handle = instances
            .get(instance_id)
            .ok_or_else(|| EngineError::InstanceNotFound(instance_id.to_string()))?;
        if handle.state.borrow().status.is_terminal() {
            return Err(EngineError::InstanceNotRunning(instance_id.to_string()));
        }
        handle
            .events
            .send(RaisedEvent {
                name: event_name.to_string(),
                payload,
            })
            .map_err(|_| EngineError::InstanceNotRunning(instance_id.to_string()))
    }
}

struct Inbox {
    rx: mpsc::UnboundedReceiver<RaisedEvent>,
    buffered: VecDeque<RaisedEvent>,
}

struct LocalWorkflowContext {
    instance_id: String,
    input: Value,
    inbox: AsyncMutex<Inbox>,
    runtime: LocalWorkflowRuntime,
    state: watch::Sender<InstanceState>,
}

impl LocalWorkflowContext {
    fn finish(&self, result: Option<Result<Value, DurableError>>) {
        match &result {
            Some(Ok(_)) => info!(instance_id = %self.instance_id, "workflow instance completed"),
            Some(Err(e)) => error!(instance_id = %self.instance_id, error = %e, "workflow instance failed"),
            None => warn!(instance_id = %self.instance_id, "workflow instance terminated"),
        }
        let completed_at = chrono::Utc::now().timestamp_millis();
        self.state.send_modify(move |s| {
            match result {
                Some(Ok(output)) => {
                    s.status = RuntimeStatus::Completed;
                    s.output = Some(output);
                }
                Some(Err(e)) => {
                    s.status = RuntimeStatus::Failed;
                    s.error = Some(e.to_string());
                }
                None => s.status = RuntimeStatus::Terminated,
            }
            s.completed_at = Some(completed_at);
        });
    }
}

#[async_trait]
impl WorkflowContext for LocalWorkflowContext {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn input(&self) -> &Value {
        &self.input
    }

    async fn wait_for_external_event(&self, event_name: &str) -> Result<Value, EngineError> {
        let mut inbox = self.inbox.lock().await;
        if let Some(pos) = inbox.buffered.iter().position(|e| e.name == event_name) {
            if let Some(event) = inbox.buffered.remove(pos) {
                return Ok(event.payload);
            }
        }
        loop {
            match inbox.rx.recv().await {
                Some(event) if event.name == event_name => return Ok(event.payload),
                Some(event) => {
                    debug!(instance_id = %self.instance_id, event = %event.name, "buffering event");
                    inbox.buffered.push_back(event);
                }
                None => return Err(EngineError::InstanceNotRunning(self.instance_id.clone())),
            }
        }
    }

    async fn call_activity(&self, activity: &str, input: Value) -> Result<Value, EngineError> {
        self.runtime.run_activity(activity, input).await
    }

    fn set_custom_status(&self, status: Value) {
        self.state.send_modify(|s| s.custom_status = Some(status));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
