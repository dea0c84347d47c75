//! 持久化执行层错误
//!
//! `Suspended` 不是失败：它是挂起信号，沿调用栈向上传递直到 Runner，
//! 期间任何隔离点（工具分发、子上下文记录）都不得吞掉或记录它。

use thiserror::Error;

/// 持久化执行层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurableError {
    /// 等待外部回调，工作流挂起
    #[error("Execution suspended awaiting callback {token}")]
    Suspended { token: String },

    #[error("Step '{name}' failed: {message}")]
    StepFailed { name: String, message: String },

    #[error("Child context '{name}' failed: {message}")]
    ChildFailed { name: String, message: String },

    #[error("Callback {token} timed out")]
    CallbackTimeout { token: String },

    #[error("Callback {token} failed: {message}")]
    CallbackFailed { token: String, message: String },

    #[error("Callback {token} already resolved")]
    AlreadyResolved { token: String },

    #[error("Unknown callback token: {token}")]
    UnknownCallback { token: String },

    #[error("Unknown execution: {id}")]
    UnknownExecution { id: String },

    #[error("Unknown workflow: {name}")]
    UnknownWorkflow { name: String },

    #[error("Execution {id} is {status} and cannot be resumed")]
    NotResumable { id: String, status: String },

    #[error("Checkpoint store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DurableError {
    pub fn is_suspension(&self) -> bool {
        matches!(self, Self::Suspended { .. })
    }
}

impl From<serde_json::Error> for DurableError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for DurableError {
    fn from(e: std::io::Error) -> Self {
        Self::Store(e.to_string())
    }
}

/// 区分「挂起信号」与真正错误；持久化层对处理函数的错误类型只要求实现此 trait
pub trait Suspension {
    fn is_suspension(&self) -> bool;
}

impl Suspension for DurableError {
    fn is_suspension(&self) -> bool {
        DurableError::is_suspension(self)
    }
}
