//! 按配置选择推理传输（DeepSeek / OpenAI 兼容 / Mock）

use std::sync::{Arc, OnceLock};

use crate::config::LlmSection;
use crate::llm::{create_deepseek_transport, InferenceTransport, MockTransport, OpenAiTransport};

/// 根据 [llm] 段创建传输；provider 未知时退回 Mock
pub fn create_transport_from_config(cfg: &LlmSection) -> Arc<dyn InferenceTransport> {
    match cfg.provider.to_lowercase().as_str() {
        "deepseek" => {
            tracing::info!("Using DeepSeek transport ({})", cfg.model);
            Arc::new(create_deepseek_transport(cfg.api_key.as_deref()))
        }
        "openai" => {
            tracing::info!(
                "Using OpenAI-compatible transport ({}, base_url={:?})",
                cfg.model,
                cfg.base_url
            );
            Arc::new(OpenAiTransport::new(
                cfg.base_url.as_deref(),
                cfg.api_key.as_deref(),
            ))
        }
        "mock" => Arc::new(MockTransport),
        other => {
            tracing::warn!("Unknown llm provider '{}', using Mock transport", other);
            Arc::new(MockTransport)
        }
    }
}

static SHARED_TRANSPORT: OnceLock<Arc<dyn InferenceTransport>> = OnceLock::new();

/// 进程级共享传输：首次调用时按配置创建，之后忽略传入配置、始终返回同一句柄
pub fn shared_transport(cfg: &LlmSection) -> Arc<dyn InferenceTransport> {
    Arc::clone(SHARED_TRANSPORT.get_or_init(|| create_transport_from_config(cfg)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_selection() {
        let mut cfg = LlmSection::default();
        assert_eq!(create_transport_from_config(&cfg).name(), "mock");
        cfg.provider = "OpenAI".into();
        assert_eq!(create_transport_from_config(&cfg).name(), "openai");
        cfg.provider = "unknown".into();
        assert_eq!(create_transport_from_config(&cfg).name(), "mock");
    }

    #[test]
    fn test_shared_transport_is_reused() {
        let cfg = LlmSection::default();
        let a = shared_transport(&cfg);
        let b = shared_transport(&LlmSection {
            provider: "openai".into(),
            ..LlmSection::default()
        });
        assert!(Arc::ptr_eq(&a, &b));
    }
}
