//! 可被编排的智能体

use async_trait::async_trait;

use crate::core::AgentError;
use crate::orchestration::scope::AgentScope;

/// 编排中的一个智能体：读写共享作用域完成一步工作
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// user 消息模板（用于 RunWorkflow 元数据）
    fn user_message(&self) -> Option<&str> {
        None
    }

    /// system 消息（用于 RunWorkflow 元数据）
    fn system_message(&self) -> Option<&str> {
        None
    }

    async fn invoke(&self, scope: &AgentScope) -> Result<(), AgentError>;
}
