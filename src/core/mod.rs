//! 核心层：错误分类、循环状态机、工具并发池

pub mod error;
pub mod state;
pub mod task_scheduler;

pub use error::AgentError;
pub use state::LoopState;
pub use task_scheduler::TaskScheduler;
