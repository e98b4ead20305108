//! 持久化工作流引擎边界：引擎接口 + 进程内运行时实现

pub mod local;
pub mod traits;

pub use local::{InstanceState, LocalWorkflowRuntime, RetryPolicy, RuntimeStatus};
pub use traits::{ActivityAttempt, Workflow, WorkflowActivity, WorkflowClient, WorkflowContext};
