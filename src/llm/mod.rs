//! LLM 层：推理网关、传输抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod factory;
pub mod gateway;
pub mod mock;
pub mod openai;
pub mod traits;

pub use deepseek::{create_deepseek_transport, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use factory::{create_transport_from_config, shared_transport};
pub use gateway::{InferenceGateway, InferenceRequest, InferenceResponse, StopKind};
pub use mock::{MockTransport, ScriptedTransport};
pub use openai::{OpenAiTransport, TokenUsage};
pub use traits::{InferenceTransport, LlmError};
