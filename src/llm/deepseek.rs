//! DeepSeek API 传输（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话，支持工具调用), deepseek-reasoner (思考模式)

use crate::llm::OpenAiTransport;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 传输；api_key 缺省时依次读取 `DEEPSEEK_API_KEY`、`OPENAI_API_KEY`
pub fn create_deepseek_transport(api_key: Option<&str>) -> OpenAiTransport {
    let api_key = api_key
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_else(|| "sk-placeholder".to_string());

    OpenAiTransport::new(Some(DEEPSEEK_BASE_URL), Some(api_key.as_str()))
}
