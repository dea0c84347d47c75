//! 推理网关
//!
//! 把对话记录 + 工具目录组装成一次推理调用，返回终止回复或工具调用请求。
//! 每次 converse 恰好发起一次出站调用；调用方必须把它包在检查点 step 里，
//! 重放时直接返回记录结果（模型输出不确定，重新调用会破坏重放一致性）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::{InferenceTransport, LlmError};
use crate::memory::{Transcript, Turn};
use crate::tools::ToolDescriptor;

/// 推理停止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Terminal,
    ToolUseRequested,
}

/// 一次推理调用的请求（借用，避免每轮复制整段对话）
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequest<'a> {
    pub model_id: &'a str,
    pub transcript: &'a Transcript,
    pub tools: &'a [ToolDescriptor],
}

/// 推理响应：Terminal 时 message 应含文本块，ToolUseRequested 时应含工具请求块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub stop_kind: StopKind,
    pub message: Turn,
}

impl InferenceResponse {
    pub fn terminal(text: impl Into<String>) -> Self {
        Self {
            stop_kind: StopKind::Terminal,
            message: Turn::assistant_text(text),
        }
    }

    pub fn tool_use(message: Turn) -> Self {
        Self {
            stop_kind: StopKind::ToolUseRequested,
            message,
        }
    }
}

/// 推理网关：共享一个传输句柄，不按调用重建
#[derive(Clone)]
pub struct InferenceGateway {
    transport: Arc<dyn InferenceTransport>,
}

impl InferenceGateway {
    pub fn new(transport: Arc<dyn InferenceTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn InferenceTransport> {
        &self.transport
    }

    /// 一次推理调用，传输错误原样返回（供 step 重试后再归类为 InferenceFailed）
    pub async fn try_converse(
        &self,
        model_id: &str,
        transcript: &Transcript,
        tools: &[ToolDescriptor],
    ) -> Result<InferenceResponse, LlmError> {
        let request = InferenceRequest {
            model_id,
            transcript,
            tools,
        };
        tracing::debug!(
            transport = self.transport.name(),
            model_id,
            turns = transcript.len(),
            tools = tools.len(),
            "inference call"
        );
        self.transport.converse(&request).await
    }

    /// 一次推理调用，失败归类为 InferenceFailed
    pub async fn converse(
        &self,
        model_id: &str,
        transcript: &Transcript,
        tools: &[ToolDescriptor],
    ) -> Result<InferenceResponse, AgentError> {
        self.try_converse(model_id, transcript, tools)
            .await
            .map_err(|e| AgentError::InferenceFailed(e.to_string()))
    }

    /// 单条提示、无工具的调用：取第一个文本块，没有则返回空串
    pub async fn converse_text(&self, model_id: &str, prompt: &str) -> Result<String, AgentError> {
        let transcript = Transcript::with_prompt(prompt);
        let response = self.converse(model_id, &transcript, &[]).await?;
        Ok(response.message.first_text().unwrap_or_default().to_string())
    }
}
