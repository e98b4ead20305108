//! 认知层：Tool Call 解析与 ReAct 智能体

pub mod agent;
pub mod planner;

pub use agent::ReactAgent;
pub use planner::{parse_llm_output, PlannerOutput, ToolCall};
