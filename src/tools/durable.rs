//! DurableTool：把任意 Tool 的调用交给 CallRouter
//!
//! 对调用方仍是 Tool::execute；有活动 Run 时调用在 CallExecutionActivity 中真正执行，
//! 字符串错误原样返回。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{failure_message, CallFailure, OperationError};
use crate::run::call::result_text;
use crate::run::{CallRouter, Invocable, Operation, RoutingContext};
use crate::tools::Tool;

#[derive(Clone)]
pub struct DurableTool {
    inner: Arc<dyn Tool>,
    router: Arc<CallRouter>,
    ctx: RoutingContext,
}

impl DurableTool {
    pub fn new(inner: Arc<dyn Tool>, router: Arc<CallRouter>, ctx: RoutingContext) -> Self {
        Self { inner, router, ctx }
    }

    pub fn inner(&self) -> &Arc<dyn Tool> {
        &self.inner
    }
}

#[async_trait]
impl Tool for DurableTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let op = Operation::tool(self.inner.name(), args);
        self.router
            .route(&self.ctx, Arc::new(self.clone()), op)
            .await
            .map(|value| result_text(&value))
            .map_err(|failure| failure_message(&failure))
    }
}

#[async_trait]
impl Invocable for DurableTool {
    async fn invoke_direct(&self, op: &Operation) -> Result<Value, CallFailure> {
        self.inner
            .execute(op.args.clone())
            .await
            .map(Value::String)
            .map_err(OperationError::failure)
    }

    /// Activity 重新进入装饰后的入口（由重入保护转为直接执行）
    async fn invoke(&self, op: &Operation) -> Result<Value, CallFailure> {
        Tool::execute(self, op.args.clone())
            .await
            .map(Value::String)
            .map_err(OperationError::failure)
    }
}
