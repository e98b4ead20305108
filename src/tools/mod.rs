//! 工具箱：Tool trait、注册表、持久化装饰器与 echo 工具

pub mod durable;
pub mod echo;
pub mod registry;

pub use durable::DurableTool;
pub use echo::EchoTool;
pub use registry::{Tool, ToolRegistry};
