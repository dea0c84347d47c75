//! 推理传输抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 InferenceTransport：一次调用 = 一次出站推理请求。
//! 传输层不做重试，失败原样上抛，由检查点 step 的重试策略决定是否重试。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::gateway::{InferenceRequest, InferenceResponse};

/// 推理传输错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// 推理传输：接收 {model_id, transcript, tool_catalog}，返回 {stop_kind, message}
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    async fn converse(&self, request: &InferenceRequest<'_>) -> Result<InferenceResponse, LlmError>;

    /// 后端名（日志用）
    fn name(&self) -> &str {
        "transport"
    }
}
