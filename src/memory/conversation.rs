//! 短期记忆：对话历史
//!
//! system 消息固定在最前，其后保留最近 N 轮对话（user/assistant 对），超出时剪枝。
//! 整个列表就是一次模型调用的参数，也是被路由的模型调用的载荷。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 短期记忆：可选 system 消息 + 最近 max_turns 轮对话
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    system: Option<Message>,
    messages: Vec<Message>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            system: None,
            messages: Vec::new(),
            max_turns,
        }
    }

    pub fn with_system(mut self, content: impl Into<String>) -> Self {
        self.system = Some(Message::system(content));
        self
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.prune();
    }

    /// 发送给模型的完整消息列表（system 在前）
    pub fn to_messages(&self) -> Vec<Message> {
        self.system
            .iter()
            .chain(self.messages.iter())
            .cloned()
            .collect()
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// 超出 max_turns*2 时丢弃最旧的消息
    fn prune(&mut self) {
        let keep = self.max_turns.max(1) * 2;
        if self.messages.len() > keep {
            self.messages.drain(..self.messages.len() - keep);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_pinned_and_history_pruned() {
        let mut memory = ConversationMemory::new(1).with_system("be brief");
        memory.push(Message::user("a"));
        memory.push(Message::assistant("b"));
        memory.push(Message::user("c"));

        let messages = memory.to_messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], Message::system("be brief"));
        assert_eq!(messages[1], Message::assistant("b"));
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "user", "content": "hi" }));
    }
}
