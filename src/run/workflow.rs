//! RunWorkflow：一个智能体一次运行的持久化状态机
//!
//! Running 状态下循环等待 agent-event：tool-call / model-call 调度 CallExecutionActivity，
//! 结果追加到 RunOutput 并发布为自定义状态；done 发布最终 RunOutput 并结束。
//! 单一消费点保证同一 Run 内的调用按到达顺序处理。Activity 失败不在此捕获，交给引擎的失败策略。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::core::DurableError;
use crate::engine::{Workflow, WorkflowContext};
use crate::observability::preview;
use crate::run::call::CallKind;
use crate::run::ids::{CallId, RunId};

/// 投递给 RunWorkflow 的事件名
pub const AGENT_EVENT: &str = "agent-event";
pub const RUN_WORKFLOW: &str = "agent-run-workflow";
pub const CALL_EXECUTION_ACTIVITY: &str = "call-execution-activity";

/// RunWorkflow 输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunInput {
    pub run_id: RunId,
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
}

impl AgentRunInput {
    pub fn new(run_id: RunId, agent_name: impl Into<String>) -> Self {
        Self {
            run_id,
            agent_name: agent_name.into(),
            user_message: None,
            system_message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentEventType {
    ToolCall,
    ModelCall,
    Done,
}

impl From<CallKind> for AgentEventType {
    fn from(kind: CallKind) -> Self {
        match kind {
            CallKind::ToolCall => AgentEventType::ToolCall,
            CallKind::ModelCall => AgentEventType::ModelCall,
        }
    }
}

/// 进程内一侧发往 RunWorkflow 的事件；done 为终止事件，不带 callId
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub event_type: AgentEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl AgentEvent {
    pub fn call(kind: CallKind, call_id: CallId, operation_name: &str, payload: String) -> Self {
        Self {
            event_type: kind.into(),
            call_id: Some(call_id),
            operation_name: Some(operation_name.to_string()),
            payload: Some(payload),
        }
    }

    pub fn done() -> Self {
        Self {
            event_type: AgentEventType::Done,
            call_id: None,
            operation_name: None,
            payload: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallActivityInput {
    pub run_id: RunId,
    pub call_id: CallId,
    pub operation_name: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallActivityOutput {
    pub operation_name: String,
    pub payload: String,
    pub result_text: String,
}

/// 一条已完成调用的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub kind: CallKind,
    pub name: String,
    pub input: String,
    pub output: String,
}

/// 运行记录：按完成顺序排列的调用，每次事件后整体发布为自定义状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub agent_name: String,
    pub calls: Vec<CallRecord>,
}

impl RunOutput {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            calls: Vec::new(),
        }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &CallRecord> {
        self.calls.iter().filter(|c| c.kind == CallKind::ToolCall)
    }

    pub fn model_calls(&self) -> impl Iterator<Item = &CallRecord> {
        self.calls.iter().filter(|c| c.kind == CallKind::ModelCall)
    }
}

pub struct RunWorkflow {
    preview_chars: usize,
}

impl RunWorkflow {
    pub fn new(preview_chars: usize) -> Self {
        Self { preview_chars }
    }
}

impl Default for RunWorkflow {
    fn default() -> Self {
        Self::new(120)
    }
}

#[async_trait]
impl Workflow for RunWorkflow {
    fn name(&self) -> &str {
        RUN_WORKFLOW
    }

    async fn run(&self, ctx: &dyn WorkflowContext) -> Result<Value, DurableError> {
        let input: AgentRunInput = serde_json::from_value(ctx.input().clone())?;
        let run_id = input.run_id.clone();
        let max = self.preview_chars;
        info!(
            run_id = %run_id,
            agent = %input.agent_name,
            user_message = ?input.user_message.as_deref().map(|s| preview(s, max)),
            system_message = ?input.system_message.as_deref().map(|s| preview(s, max)),
            "run workflow started"
        );

        let mut output = RunOutput::new(input.agent_name.clone());
        ctx.set_custom_status(serde_json::to_value(&output)?);

        loop {
            let raw = ctx.wait_for_external_event(AGENT_EVENT).await?;
            let event: AgentEvent = serde_json::from_value(raw)
                .map_err(|e| DurableError::MalformedEvent(e.to_string()))?;

            let kind = match event.event_type {
                AgentEventType::Done => {
                    info!(
                        run_id = %run_id,
                        agent = %input.agent_name,
                        tool_calls = output.tool_calls().count(),
                        model_calls = output.model_calls().count(),
                        "run workflow completed"
                    );
                    let status = serde_json::to_value(&output)?;
                    ctx.set_custom_status(status.clone());
                    return Ok(status);
                }
                AgentEventType::ToolCall => CallKind::ToolCall,
                AgentEventType::ModelCall => CallKind::ModelCall,
            };

            let call_id = event
                .call_id
                .ok_or_else(|| DurableError::MalformedEvent("call event without callId".into()))?;
            let operation_name = event.operation_name.unwrap_or_default();
            let payload = event.payload.unwrap_or_default();
            info!(
                run_id = %run_id,
                call_id = %call_id,
                operation = %operation_name,
                payload = %preview(&payload, max),
                "scheduling call execution"
            );

            let activity_input = CallActivityInput {
                run_id: run_id.clone(),
                call_id: call_id.clone(),
                operation_name,
                payload,
            };
            let result = ctx
                .call_activity(CALL_EXECUTION_ACTIVITY, serde_json::to_value(&activity_input)?)
                .await?;
            let result: CallActivityOutput = serde_json::from_value(result)?;
            info!(
                run_id = %run_id,
                call_id = %call_id,
                operation = %result.operation_name,
                result = %preview(&result.result_text, max),
                "call execution completed"
            );

            output.calls.push(CallRecord {
                kind,
                name: result.operation_name,
                input: result.payload,
                output: result.result_text,
            });
            ctx.set_custom_status(serde_json::to_value(&output)?);
        }
    }
}
