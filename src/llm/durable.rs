//! DurableLlmClient：把模型调用交给 CallRouter
//!
//! 操作名为 complete，参数是完整的消息列表（JSON），由 CallExecutionActivity 在活动 Run 中执行。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{failure_message, CallFailure, DurableError, OperationError};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::run::call::result_text;
use crate::run::{CallRouter, Invocable, Operation, RoutingContext};

pub const COMPLETE_OPERATION: &str = "complete";

#[derive(Clone)]
pub struct DurableLlmClient {
    inner: Arc<dyn LlmClient>,
    router: Arc<CallRouter>,
    ctx: RoutingContext,
}

impl DurableLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, router: Arc<CallRouter>, ctx: RoutingContext) -> Self {
        Self { inner, router, ctx }
    }

    fn messages(op: &Operation) -> Result<Vec<Message>, CallFailure> {
        serde_json::from_value(op.args.clone())
            .map_err(|e| Arc::new(DurableError::from(e)) as CallFailure)
    }
}

#[async_trait]
impl LlmClient for DurableLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let args = serde_json::to_value(messages).map_err(|e| e.to_string())?;
        let op = Operation::model(COMPLETE_OPERATION, args);
        self.router
            .route(&self.ctx, Arc::new(self.clone()), op)
            .await
            .map(|value| result_text(&value))
            .map_err(|failure| failure_message(&failure))
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[async_trait]
impl Invocable for DurableLlmClient {
    async fn invoke_direct(&self, op: &Operation) -> Result<Value, CallFailure> {
        let messages = Self::messages(op)?;
        self.inner
            .complete(&messages)
            .await
            .map(Value::String)
            .map_err(OperationError::failure)
    }

    async fn invoke(&self, op: &Operation) -> Result<Value, CallFailure> {
        let messages = Self::messages(op)?;
        LlmClient::complete(self, &messages)
            .await
            .map(Value::String)
            .map_err(OperationError::failure)
    }
}
