//! 核心层：错误类型与组合根

pub mod builder;
pub mod error;

pub use builder::{create_services, try_create_services, DurableServices, STANDALONE_AGENT};
pub use error::{failure_message, AgentError, CallFailure, DurableError, EngineError, OperationError};
