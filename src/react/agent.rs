//! ReAct 智能体
//!
//! Plan -> Act (Tool) -> Observe -> 下一轮 Plan，直到模型给出最终回复或达到步数上限。
//! 作为编排中的一步时，user 消息由共享作用域中的 {{key}} 渲染，最终回复写回 output_key。
//! 模型客户端与工具注册表通常是装饰过的（DurableLlmClient / into_durable），调用因此落在活动 Run 中。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::AgentSection;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{ConversationMemory, Message};
use crate::observability::preview;
use crate::orchestration::{Agent, AgentScope};
use crate::react::planner::{parse_llm_output, PlannerOutput};
use crate::tools::ToolRegistry;

/// 日志中观察结果的预览长度
const OBSERVATION_PREVIEW_CHARS: usize = 200;

pub struct ReactAgent {
    name: String,
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    system_prompt: Option<String>,
    user_template: String,
    output_key: String,
    max_steps: usize,
    max_context_turns: usize,
}

impl ReactAgent {
    /// 新建智能体；最终回复默认写入与名称同名的键
    pub fn new(
        name: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        user_template: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let defaults = AgentSection::default();
        Self {
            output_key: name.clone(),
            name,
            llm,
            tools,
            system_prompt: None,
            user_template: user_template.into(),
            max_steps: defaults.max_steps,
            max_context_turns: defaults.max_context_turns,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    pub fn with_config(mut self, section: &AgentSection) -> Self {
        self.max_steps = section.max_steps;
        self.max_context_turns = section.max_context_turns;
        self
    }

    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    /// system 提示词 + 可用工具列表
    fn full_system_prompt(&self) -> Option<String> {
        let tools = self.tools.tool_descriptions();
        if tools.is_empty() {
            return self.system_prompt.clone();
        }
        let mut prompt = self.system_prompt.clone().unwrap_or_default();
        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str("Available tools (reply with {\"tool\": name, \"args\": {...}}):");
        for (name, description) in tools {
            prompt.push_str(&format!("\n- {}: {}", name, description));
        }
        Some(prompt)
    }

    /// 对一条 user 输入运行 ReAct 循环，返回最终回复
    pub async fn run(&self, user_input: &str) -> Result<String, AgentError> {
        let mut memory = ConversationMemory::new(self.max_context_turns);
        if let Some(system) = self.full_system_prompt() {
            memory = memory.with_system(system);
        }
        memory.push(Message::user(user_input));

        for step in 1..=self.max_steps {
            let output = self
                .llm
                .complete(&memory.to_messages())
                .await
                .map_err(AgentError::LlmError)?;
            debug!(agent = %self.name, step, output = %preview(&output, OBSERVATION_PREVIEW_CHARS), "model replied");

            match parse_llm_output(&output)? {
                PlannerOutput::Response(answer) => {
                    info!(agent = %self.name, step, "agent answered");
                    return Ok(answer);
                }
                PlannerOutput::ToolCall(call) => {
                    if !self.tools.contains(&call.tool) {
                        warn!(agent = %self.name, tool = %call.tool, available = ?self.tools.tool_names(), "model requested unknown tool");
                        return Err(AgentError::HallucinatedTool(call.tool));
                    }
                    memory.push(Message::assistant(output.clone()));
                    let observation = self
                        .tools
                        .execute(&call.tool, call.args)
                        .await
                        .map_err(AgentError::ToolExecutionFailed)?;
                    debug!(
                        agent = %self.name,
                        tool = %call.tool,
                        observation = %preview(&observation, OBSERVATION_PREVIEW_CHARS),
                        "tool observed"
                    );
                    memory.push(Message::user(format!(
                        "Observation from {}: {}",
                        call.tool, observation
                    )));
                }
            }
        }

        Err(AgentError::MaxStepsExceeded(self.max_steps))
    }
}

#[async_trait]
impl Agent for ReactAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn user_message(&self) -> Option<&str> {
        Some(&self.user_template)
    }

    fn system_message(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    async fn invoke(&self, scope: &AgentScope) -> Result<(), AgentError> {
        let input = scope.render(&self.user_template);
        let answer = self.run(&input).await?;
        scope.set(self.output_key.clone(), Value::String(answer));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::EchoTool;

    fn echo_tools() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        tools
    }

    struct Scripted(Mutex<Vec<String>>);

    #[async_trait]
    impl LlmClient for Scripted {
        async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
            let mut replies = self.0.lock().unwrap();
            if replies.is_empty() {
                return Err("script exhausted".into());
            }
            Ok(replies.remove(0))
        }
    }

    #[tokio::test]
    async fn test_invoke_renders_template_and_writes_answer() {
        let agent = ReactAgent::new("writer", Arc::new(MockLlmClient::new()), echo_tools(), "Write about {{topic}}")
            .with_output_key("draft");
        let scope = AgentScope::new().with("topic", "rust");
        agent.invoke(&scope).await.unwrap();
        assert_eq!(scope.get_text("draft").as_deref(), Some("Final answer: Write about rust"));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_step_limit() {
        let llm = Arc::new(Scripted(Mutex::new(vec![r#"{"tool": "rm", "args": {}}"#.into()])));
        let agent = ReactAgent::new("a", llm, echo_tools(), "go");
        assert!(matches!(agent.run("go").await, Err(AgentError::HallucinatedTool(t)) if t == "rm"));

        let llm = Arc::new(Scripted(Mutex::new(vec![
            r#"{"tool": "echo", "args": {"text": "1"}}"#.into(),
            r#"{"tool": "echo", "args": {"text": "2"}}"#.into(),
        ])));
        let agent = ReactAgent::new("a", llm, echo_tools(), "go").with_config(&AgentSection {
            max_steps: 2,
            max_context_turns: 4,
        });
        assert!(matches!(agent.run("go").await, Err(AgentError::MaxStepsExceeded(2))));
    }

    #[tokio::test]
    async fn test_tool_failure_is_fatal() {
        let llm = Arc::new(Scripted(Mutex::new(vec![r#"{"tool": "echo", "args": {}}"#.into()])));
        let agent = ReactAgent::new("a", llm, echo_tools(), "go");
        assert!(matches!(agent.run("go").await, Err(AgentError::ToolExecutionFailed(_))));
    }
}
