//! 错误类型：引擎层、桥接层与智能体层
//!
//! - EngineError：持久化工作流引擎（调度 / 事件 / Activity）返回的错误
//! - DurableError：会合桥接层错误；查找类错误不可重试（生命周期 bug），操作失败可重试
//! - AgentError：智能体运行错误（LLM、解析、工具、步数上限等）
//!
//! 被路由调用的失败原因统一为 CallFailure（Arc<dyn Error>），同一份原因既交给阻塞的调用方，也挂在 Activity 的失败上。

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// 被路由调用的原始失败原因（可在调用方与 Activity 之间共享）
pub type CallFailure = Arc<dyn StdError + Send + Sync>;

/// 工具 / 模型客户端以 String 返回的错误，原样跨越会合边界
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct OperationError(pub String);

impl OperationError {
    pub fn failure(message: impl Into<String>) -> CallFailure {
        Arc::new(Self(message.into()))
    }
}

/// 将 CallFailure 还原为字符串：OperationError 原样返回，其余错误取 Display
pub fn failure_message(failure: &CallFailure) -> String {
    match (**failure).downcast_ref::<OperationError>() {
        Some(OperationError(message)) => message.clone(),
        None => failure.to_string(),
    }
}

/// 持久化工作流引擎错误
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("Workflow not registered: {0}")]
    WorkflowNotRegistered(String),

    #[error("Activity not registered: {0}")]
    ActivityNotRegistered(String),

    #[error("Workflow instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Workflow instance is not running: {0}")]
    InstanceNotRunning(String),

    #[error("Workflow instance already running: {0}")]
    InstanceAlreadyRunning(String),

    #[error("Activity {activity} failed: {message}")]
    ActivityFailed {
        activity: String,
        message: String,
        retryable: bool,
    },

    #[error("Timed out waiting for workflow instance: {0}")]
    WaitTimeout(String),

    #[error("Workflow runtime is shut down")]
    Shutdown,

    #[error("Invalid payload: {0}")]
    Payload(String),
}

/// 会合桥接层错误
#[derive(Error, Debug)]
pub enum DurableError {
    #[error("No run found for run id: {run_id}. Registered IDs: {registered:?}")]
    RunNotFound {
        run_id: String,
        registered: Vec<String>,
    },

    #[error("No pending call found for call id: {call_id} in run id: {run_id}")]
    PendingCallNotFound { run_id: String, call_id: String },

    #[error("No planner found for ID: {planner_id}. Registered IDs: {registered:?}")]
    PlannerNotFound {
        planner_id: String,
        registered: Vec<String>,
    },

    #[error("Agent index {index} out of range for planner {planner_id} ({count} agents)")]
    AgentIndexOutOfRange {
        planner_id: String,
        index: usize,
        count: usize,
    },

    #[error("Duplicate call id {call_id} in run {run_id}")]
    DuplicateCallId { run_id: String, call_id: String },

    #[error("Malformed agent event: {0}")]
    MalformedEvent(String),

    #[error("Operation {operation} failed: {source}")]
    OperationFailed {
        operation: String,
        #[source]
        source: CallFailure,
    },

    #[error("Pending call {call_id} in run {run_id} was abandoned before completion")]
    CallAbandoned { run_id: String, call_id: String },

    #[error("Pending call {call_id} in run {run_id} timed out after {timeout_ms} ms")]
    CallTimeout {
        run_id: String,
        call_id: String,
        timeout_ms: u64,
    },

    #[error("Planner {0} is closed")]
    PlannerClosed(String),

    #[error("Orchestration {planner_id} failed: {message}")]
    OrchestrationFailed { planner_id: String, message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl DurableError {
    /// 是否值得由引擎重试：查找 / 生命周期类错误直接失败，操作失败与引擎故障交给重试策略
    pub fn is_retryable(&self) -> bool {
        match self {
            DurableError::OperationFailed { .. } => true,
            DurableError::Engine(EngineError::ActivityFailed { retryable, .. }) => *retryable,
            DurableError::Engine(EngineError::Shutdown) => false,
            DurableError::Engine(_) => true,
            _ => false,
        }
    }
}

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Max steps exceeded: {0}")]
    MaxStepsExceeded(usize),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Durable(#[from] DurableError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_restores_operation_error() {
        let failure = OperationError::failure("bad country");
        assert_eq!(failure_message(&failure), "bad country");

        let other: CallFailure = Arc::new(DurableError::PlannerClosed("p1".into()));
        assert_eq!(failure_message(&other), "Planner p1 is closed");
    }

    #[test]
    fn test_lookup_errors_are_not_retryable() {
        let err = DurableError::RunNotFound {
            run_id: "r1".into(),
            registered: vec![],
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("r1"));

        let err = DurableError::PendingCallNotFound {
            run_id: "r1".into(),
            call_id: "c1".into(),
        };
        assert!(!err.is_retryable());

        let err = DurableError::OperationFailed {
            operation: "get_capital".into(),
            source: OperationError::failure("boom"),
        };
        assert!(err.is_retryable());
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("boom".to_string())
        );
    }
}
