//! 被路由调用的描述：调用类别、操作（名称 + 参数）与可调用目标

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::CallFailure;

/// 调用类别（工具调用 / 模型调用），序列化为 tool-call / model-call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallKind {
    ToolCall,
    ModelCall,
}

/// 一次调用的操作描述：名称 + JSON 参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: CallKind,
    pub name: String,
    pub args: Value,
}

impl Operation {
    pub fn tool(name: impl Into<String>, args: Value) -> Self {
        Self {
            kind: CallKind::ToolCall,
            name: name.into(),
            args,
        }
    }

    pub fn model(name: impl Into<String>, args: Value) -> Self {
        Self {
            kind: CallKind::ModelCall,
            name: name.into(),
            args,
        }
    }

    /// 事件 / Activity 中携带的参数文本
    pub fn payload(&self) -> String {
        match &self.args {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// 可被挂起后再由 Activity 执行的目标
///
/// `invoke` 是调用入口（装饰器在此接入路由，Activity 重新进入时走这里）；
/// `invoke_direct` 是不经路由的真实执行。
#[async_trait]
pub trait Invocable: Send + Sync {
    async fn invoke_direct(&self, op: &Operation) -> Result<Value, CallFailure>;

    async fn invoke(&self, op: &Operation) -> Result<Value, CallFailure> {
        self.invoke_direct(op).await
    }
}

pub type CallTarget = Arc<dyn Invocable>;

/// 结果的文本形式（字符串去引号，其余取 JSON 文本）
pub fn result_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_serializes_kebab_case() {
        assert_eq!(serde_json::to_value(CallKind::ToolCall).unwrap(), json!("tool-call"));
        assert_eq!(serde_json::to_value(CallKind::ModelCall).unwrap(), json!("model-call"));
    }

    #[test]
    fn test_payload_and_result_text() {
        let op = Operation::tool("get_capital", json!({ "country": "France" }));
        assert_eq!(op.payload(), r#"{"country":"France"}"#);
        assert_eq!(result_text(&json!("Paris")), "Paris");
        assert_eq!(result_text(&json!(3)), "3");
    }
}
