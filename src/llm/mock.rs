//! Mock LLM 客户端（用于测试与演示，无需 API）
//!
//! 最后一条 User 消息是工具观察结果时给出最终回复，否则把它包成 echo 工具调用，
//! 这样一次 ReAct 运行恰好产生两次模型调用和一次工具调用。

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::json;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

/// 观察结果消息的前缀（ReAct 智能体把工具输出以此开头写回）
pub const OBSERVATION_PREFIX: &str = "Observation";

#[derive(Debug, Default)]
pub struct MockLlmClient {
    calls: AtomicU64,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已处理的 complete 次数
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .ok_or_else(|| "mock model received no user message".to_string())?;

        if let Some(observation) = last_user.strip_prefix(OBSERVATION_PREFIX) {
            let answer = observation
                .split_once(':')
                .map(|(_, text)| text)
                .unwrap_or(observation)
                .trim();
            return Ok(format!("Final answer: {}", answer));
        }

        Ok(json!({ "tool": "echo", "args": { "text": last_user } }).to_string())
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        let calls = self.calls();
        (calls, calls, calls * 2)
    }
}
