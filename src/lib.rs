//! durable-agents：让智能体的每次工具调用与模型调用经持久化工作流执行
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与组合根（DurableServices）
//! - **engine**: 持久化工作流引擎接口与进程内运行时
//! - **run**: 同步调用 / 工作流会合（路由、挂起调用表、RunWorkflow、CallExecutionActivity）
//! - **orchestration**: 锁步编排规划器、编排工作流与 Activity、构建器
//! - **tools**: Tool trait、注册表与持久化装饰器
//! - **llm**: LLM 客户端抽象、持久化装饰器与 Mock
//! - **memory**: 对话历史
//! - **react**: ReAct 智能体
//! - **observability**: 日志初始化

pub mod config;
pub mod core;
pub mod engine;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod orchestration;
pub mod react;
pub mod run;
pub mod tools;

pub use crate::core::{DurableServices, DurableError};
pub use orchestration::{Orchestration, OrchestrationBuilder, Topology};
pub use run::{CallRouter, RoutingContext, RunId};
