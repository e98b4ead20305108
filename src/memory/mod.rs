//! 记忆层：智能体运行期间的短期对话历史

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
