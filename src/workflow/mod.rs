//! 内置工作流：每个处理函数接收 JSON 输入、返回 JSON，在 DurableContext 上用 step / map / 回调组织检查点

pub mod agent;
pub mod checkpointed_agent;
pub mod human_review;
pub mod llm_as_judge;
pub mod parallel_invocation;
pub mod prompt_chaining;
pub mod structured_output;

use std::sync::Arc;

use serde_json::Value;

use crate::config::AppConfig;
use crate::core::{AgentError, TaskScheduler};
use crate::durable::DurableRunner;
use crate::llm::InferenceGateway;
use crate::tools::{CallbackNotifier, LogNotifier};

pub use agent::AgentWorkflow;
pub use checkpointed_agent::CheckpointedAgentWorkflow;
pub use human_review::HumanReviewWorkflow;
pub use llm_as_judge::LlmAsJudgeWorkflow;
pub use parallel_invocation::ParallelInvocationWorkflow;
pub use prompt_chaining::PromptChainingWorkflow;
pub use structured_output::StructuredOutputWorkflow;

/// 工作流共享依赖：推理网关（共享同一传输句柄）、模型、回调通知方
#[derive(Clone)]
pub struct WorkflowDeps {
    pub gateway: InferenceGateway,
    /// 主模型
    pub model: String,
    /// 轻量模型（生成、评审、抽取）
    pub small_model: String,
    pub notifier: Arc<dyn CallbackNotifier>,
    pub scheduler: TaskScheduler,
}

impl WorkflowDeps {
    pub fn new(gateway: InferenceGateway, model: impl Into<String>, small_model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
            small_model: small_model.into(),
            notifier: Arc::new(LogNotifier),
            scheduler: TaskScheduler::default(),
        }
    }

    pub fn from_config(gateway: InferenceGateway, cfg: &AppConfig) -> Self {
        Self::new(gateway, cfg.llm.model.clone(), cfg.llm.small_model.clone())
            .with_scheduler(TaskScheduler::new(cfg.tools.max_concurrent_tools))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CallbackNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }
}

/// 注册全部内置工作流
pub fn register_builtin_workflows(runner: &mut DurableRunner, deps: &WorkflowDeps) {
    runner.register(AgentWorkflow::new(deps.clone()));
    runner.register(PromptChainingWorkflow::new(deps.clone()));
    runner.register(ParallelInvocationWorkflow::new(deps.clone()));
    runner.register(LlmAsJudgeWorkflow::new(deps.clone()));
    runner.register(HumanReviewWorkflow::new(deps.clone()));
    runner.register(StructuredOutputWorkflow::new(deps.clone()));
    runner.register(CheckpointedAgentWorkflow::new(deps.clone()));
}

/// 取输入对象中的可选字符串字段；字段存在但不是字符串时报 InvalidInput
pub(crate) fn input_str(input: &Value, key: &str, default: &str) -> Result<String, AgentError> {
    match input.get(key) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(AgentError::InvalidInput(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_str() {
        assert_eq!(input_str(&json!({}), "topic", "x").unwrap(), "x");
        assert_eq!(input_str(&Value::Null, "topic", "x").unwrap(), "x");
        assert_eq!(input_str(&json!({"topic": "rust"}), "topic", "x").unwrap(), "rust");
        assert!(input_str(&json!({"topic": 3}), "topic", "x").is_err());
    }
}
