//! agent 工作流：带工具调用的 Agent 循环（get_location / get_weather / wait_for_human_review）
//!
//! 每次推理调用与每次工具执行都有检查点；人工审核工具挂起整个执行，回调到达后重放继续。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::durable::{DurableContext, Workflow};
use crate::react::AgentLoop;
use crate::tools::{GetLocationTool, GetWeatherTool, ToolRegistry, WaitForHumanReviewTool};
use crate::workflow::{input_str, WorkflowDeps};

pub const DEFAULT_PROMPT: &str =
    "What's the weather where I am? Get human review before you return the answer";

pub struct AgentWorkflow {
    deps: WorkflowDeps,
    registry: Arc<ToolRegistry>,
}

impl AgentWorkflow {
    pub fn new(deps: WorkflowDeps) -> Self {
        let registry = Arc::new(default_registry(&deps));
        Self { deps, registry }
    }

    /// 使用自定义工具集
    pub fn with_registry(deps: WorkflowDeps, registry: Arc<ToolRegistry>) -> Self {
        Self { deps, registry }
    }
}

/// 内置工具集（注册顺序固定）
pub fn default_registry(deps: &WorkflowDeps) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let tools: [Arc<dyn crate::tools::Tool>; 3] = [
        Arc::new(GetLocationTool),
        Arc::new(GetWeatherTool),
        Arc::new(WaitForHumanReviewTool::new(Arc::clone(&deps.notifier))),
    ];
    for tool in tools {
        if let Err(e) = registry.register_arc(tool) {
            tracing::warn!("builtin tool not registered: {}", e);
        }
    }
    registry
}

#[async_trait]
impl Workflow for AgentWorkflow {
    fn name(&self) -> &str {
        "agent"
    }

    async fn run(&self, input: Value, ctx: &DurableContext) -> Result<Value, AgentError> {
        let prompt = input_str(&input, "prompt", DEFAULT_PROMPT)?;
        let agent = AgentLoop::new(
            self.deps.gateway.clone(),
            Arc::clone(&self.registry),
            self.deps.model.clone(),
        )
        .with_scheduler(self.deps.scheduler.clone());
        let run = agent.run(ctx, &prompt).await?;
        Ok(Value::String(run.result))
    }
}
