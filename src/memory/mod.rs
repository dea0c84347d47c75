//! 记忆层：智能体对话记录（Transcript），可序列化进检查点

pub mod transcript;

pub use transcript::{ContentBlock, Role, ToolInput, ToolRequest, ToolResult, Transcript, Turn};
