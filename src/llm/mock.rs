//! Mock 推理传输（用于测试与离线运行，无需 API）
//!
//! - MockTransport：回显最后一条用户文本（或工具结果）作为终止回复，便于本地跑通工作流；
//! - ScriptedTransport：按顺序返回预设响应，或由闭包按请求生成响应；统计调用次数并保留请求快照。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::gateway::{InferenceRequest, InferenceResponse};
use crate::llm::{InferenceTransport, LlmError};
use crate::memory::{ContentBlock, Role, Transcript};

/// Mock 传输：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockTransport;

#[async_trait]
impl InferenceTransport for MockTransport {
    async fn converse(&self, request: &InferenceRequest<'_>) -> Result<InferenceResponse, LlmError> {
        let last_user = request
            .transcript
            .turns()
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .and_then(|t| {
                t.content.iter().find_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::ToolResult(res) => Some(res.output.as_str()),
                    ContentBlock::ToolRequest(_) => None,
                })
            })
            .unwrap_or("(no input)");
        Ok(InferenceResponse::terminal(format!("Echo from Mock: {last_user}")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

type Responder = dyn Fn(&InferenceRequest<'_>) -> Result<InferenceResponse, LlmError> + Send + Sync;

enum ScriptEntry {
    Respond(Result<InferenceResponse, LlmError>),
    /// 永不返回，模拟调用途中进程崩溃
    Hang,
}

/// 脚本化传输：测试中替代网络
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptEntry>>,
    responder: Option<Box<Responder>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(String, Transcript)>>,
}

impl ScriptedTransport {
    /// 按顺序返回给定响应，耗尽后返回 ApiError
    pub fn new(responses: Vec<Result<InferenceResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(ScriptEntry::Respond).collect()),
            responder: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 由闭包根据请求生成响应（并发调用顺序不确定时使用）
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&InferenceRequest<'_>) -> Result<InferenceResponse, LlmError> + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 脚本末尾追加一次永不返回的调用
    pub fn then_hang(self) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(ScriptEntry::Hang);
        self
    }

    /// 已发生的调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用时的 (model_id, transcript) 快照
    pub fn requests(&self) -> Vec<(String, Transcript)> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl InferenceTransport for ScriptedTransport {
    async fn converse(&self, request: &InferenceRequest<'_>) -> Result<InferenceResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((request.model_id.to_string(), request.transcript.clone()));

        if let Some(responder) = &self.responder {
            return responder(request);
        }
        let entry = self
            .script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match entry {
            Some(ScriptEntry::Respond(result)) => result,
            Some(ScriptEntry::Hang) => std::future::pending().await,
            None => Err(LlmError::ApiError("script exhausted".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_last_user_text() {
        let transcript = Transcript::with_prompt("hello");
        let request = InferenceRequest {
            model_id: "m",
            transcript: &transcript,
            tools: &[],
        };
        let response = MockTransport.converse(&request).await.unwrap();
        assert_eq!(response.message.first_text(), Some("Echo from Mock: hello"));
    }

    #[tokio::test]
    async fn test_scripted_exhausts() {
        let transport = ScriptedTransport::new(vec![Ok(InferenceResponse::terminal("one"))]);
        let transcript = Transcript::with_prompt("q");
        let request = InferenceRequest {
            model_id: "m",
            transcript: &transcript,
            tools: &[],
        };
        assert!(transport.converse(&request).await.is_ok());
        assert!(transport.converse(&request).await.is_err());
        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.requests()[0].0, "m");
    }
}
