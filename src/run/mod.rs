//! 同步调用 / 持久化工作流会合
//!
//! 智能体侧的工具调用与模型调用经 CallRouter 登记到挂起调用表并通知 RunWorkflow，
//! RunWorkflow 调度 CallExecutionActivity 执行真实调用后完成挂起调用，调用方随之解除等待。

pub mod activity;
pub mod call;
pub mod context;
pub mod guard;
pub mod ids;
pub mod lifecycle;
pub mod pending;
pub mod registry;
pub mod router;
pub mod workflow;

pub use activity::CallExecutionActivity;
pub use call::{CallKind, CallTarget, Invocable, Operation};
pub use context::{RoutingContext, RunActivator, RunMetadata};
pub use guard::ReentrancyGuard;
pub use ids::{CallId, RunId};
pub use lifecycle::{RequestRun, RunLifecycle};
pub use pending::{PendingCall, PendingCallTable, PendingResult};
pub use registry::RunRegistry;
pub use router::CallRouter;
pub use workflow::{
    AgentEvent, AgentEventType, AgentRunInput, CallActivityInput, CallActivityOutput, CallRecord,
    RunOutput, RunWorkflow, AGENT_EVENT, CALL_EXECUTION_ACTIVITY, RUN_WORKFLOW,
};
