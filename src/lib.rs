//! Bee Durable - 可持久化、可重放的智能体工具调用循环
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、循环状态机、工具并发池
//! - **durable**: 检查点 step / 子单元 / 并行 map / 等待回调，检查点存储与运行器
//! - **integrations**: 执行与回调 HTTP 端点（feature = "server"）
//! - **llm**: 推理网关与传输实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话记录（Transcript）
//! - **observability**: 日志初始化
//! - **react**: Agent 循环
//! - **tools**: 工具注册表、派发器与内置工具
//! - **workflow**: 内置工作流

pub mod config;
pub mod core;
pub mod durable;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
pub mod workflow;

pub use crate::core::AgentError;
pub use durable::{DurableContext, DurableError, DurableRunner, Execution, ExecutionOutcome, Workflow};
pub use react::{AgentLoop, AgentRun};
