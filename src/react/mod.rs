//! Agent 循环层：推理 → 工具派发 → 回填结果，直到 Terminal

pub mod events;
pub mod loop_;

pub use events::LoopEvent;
pub use loop_::{AgentLoop, AgentRun};
