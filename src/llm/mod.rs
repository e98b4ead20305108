//! LLM 层：客户端抽象、持久化装饰器与 Mock 实现

pub mod durable;
pub mod mock;
pub mod traits;

pub use durable::DurableLlmClient;
pub use mock::MockLlmClient;
pub use traits::LlmClient;
