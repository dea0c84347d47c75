//! Agent 错误类型
//!
//! 传播策略：工具内部错误在工具子单元内被转换为错误 ToolResult，不终止循环；
//! 推理调用错误（重试耗尽后）与 MalformedResponse 终止工作流；挂起信号不是错误，原样上抛。

use thiserror::Error;

use crate::durable::{DurableError, Suspension};

/// Agent 循环与工作流处理函数的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// 推理传输或模型错误（由 step 重试策略决定是否重试）
    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    /// 模型请求了未注册的工具（非致命，以错误 ToolResult 反馈给模型）
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// 推理网关返回违反约定的响应（致命）
    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateName(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Durable(#[from] DurableError),
}

impl AgentError {
    /// 挂起信号（需要原样上抛给 Runner）
    pub fn is_suspension(&self) -> bool {
        matches!(self, Self::Durable(e) if e.is_suspension())
    }
}

impl Suspension for AgentError {
    fn is_suspension(&self) -> bool {
        AgentError::is_suspension(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suspension_detection() {
        let suspended = AgentError::from(DurableError::Suspended {
            token: "cb_1".to_string(),
        });
        assert!(suspended.is_suspension());

        let timeout = AgentError::from(DurableError::CallbackTimeout {
            token: "cb_1".to_string(),
        });
        assert!(!timeout.is_suspension());
        assert!(!AgentError::UnknownTool("x".into()).is_suspension());
    }

    #[test]
    fn test_durable_errors_display_transparently() {
        let err = AgentError::from(DurableError::AlreadyResolved {
            token: "cb_9".to_string(),
        });
        assert_eq!(err.to_string(), "Callback cb_9 already resolved");
    }
}
