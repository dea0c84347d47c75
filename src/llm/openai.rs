//! OpenAI 兼容 API 传输
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 请求体按 Chat Completions + tools 格式手工组装（byot），响应解析为 Terminal / ToolUseRequested。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::Client;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::gateway::{InferenceRequest, InferenceResponse, StopKind};
use crate::llm::{InferenceTransport, LlmError};
use crate::memory::{ContentBlock, Role, ToolInput, Transcript, Turn};
use crate::tools::ToolDescriptor;

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    /// (prompt, completion, total)
    pub fn get(&self) -> (u64, u64, u64) {
        let prompt = self.prompt_tokens.load(Ordering::Relaxed);
        let completion = self.completion_tokens.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

/// OpenAI 兼容传输：持有 Client，model 由每次请求指定
pub struct OpenAiTransport {
    client: Client<OpenAIConfig>,
    pub usage: TokenUsage,
}

impl OpenAiTransport {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            usage: TokenUsage::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    finish_reason: Option<String>,
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Transcript -> Chat Completions messages。工具结果拆成独立的 `tool` 角色消息
fn to_wire_messages(transcript: &Transcript) -> Vec<Value> {
    let mut messages = Vec::new();
    for turn in transcript.turns() {
        match turn.role {
            Role::User => {
                for block in &turn.content {
                    match block {
                        ContentBlock::Text { text } => {
                            messages.push(json!({"role": "user", "content": text}))
                        }
                        ContentBlock::ToolResult(res) => messages.push(json!({
                            "role": "tool",
                            "tool_call_id": res.id,
                            "content": res.output,
                        })),
                        ContentBlock::ToolRequest(_) => {}
                    }
                }
            }
            Role::Assistant => {
                let text: Vec<&str> = turn.content.iter().filter_map(ContentBlock::as_text).collect();
                let tool_calls: Vec<Value> = turn
                    .tool_requests()
                    .into_iter()
                    .map(|req| {
                        json!({
                            "id": req.id,
                            "type": "function",
                            "function": {
                                "name": req.name,
                                "arguments": serde_json::to_string(&req.input).unwrap_or_else(|_| "{}".to_string()),
                            }
                        })
                    })
                    .collect();
                let mut message = json!({
                    "role": "assistant",
                    "content": if text.is_empty() { Value::Null } else { Value::String(text.join("\n")) },
                });
                if !tool_calls.is_empty() {
                    message["tool_calls"] = Value::Array(tool_calls);
                }
                messages.push(message);
            }
        }
    }
    messages
}

fn to_wire_tools(tools: &[ToolDescriptor]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect()
}

/// 工具参数 JSON -> 字符串映射；非字符串值保留其 JSON 文本
fn parse_arguments(raw: &str) -> Result<ToolInput, LlmError> {
    if raw.trim().is_empty() {
        return Ok(ToolInput::new());
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| LlmError::InvalidResponse(format!("tool arguments: {e}: {raw}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| LlmError::InvalidResponse(format!("tool arguments not an object: {raw}")))?;
    Ok(object
        .iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect())
}

fn from_wire(response: ChatResponse) -> Result<InferenceResponse, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("no choices".to_string()))?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
        content.push(ContentBlock::text(text));
    }
    let tool_calls = choice.message.tool_calls.unwrap_or_default();
    let has_calls = !tool_calls.is_empty();
    for call in tool_calls {
        let input = parse_arguments(&call.function.arguments)?;
        content.push(ContentBlock::tool_request(call.id, call.function.name, input));
    }

    let stop_kind = if choice.finish_reason.as_deref() == Some("tool_calls") || has_calls {
        StopKind::ToolUseRequested
    } else {
        StopKind::Terminal
    };
    Ok(InferenceResponse {
        stop_kind,
        message: Turn::assistant(content),
    })
}

#[async_trait]
impl InferenceTransport for OpenAiTransport {
    async fn converse(&self, request: &InferenceRequest<'_>) -> Result<InferenceResponse, LlmError> {
        let mut body = json!({
            "model": request.model_id,
            "messages": to_wire_messages(request.transcript),
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(to_wire_tools(request.tools));
        }

        let response: ChatResponse = self
            .client
            .chat()
            .create_byot(body)
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }
        from_wire(response)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
