//! checkpointed_agent 工作流：整段模型回答包在一个 step 里，重放时直接返回记录值

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::durable::{DurableContext, Workflow};
use crate::workflow::{input_str, WorkflowDeps};

pub const DEFAULT_PROMPT: &str = "What is the capital of France?";

pub struct CheckpointedAgentWorkflow {
    deps: WorkflowDeps,
}

impl CheckpointedAgentWorkflow {
    pub fn new(deps: WorkflowDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Workflow for CheckpointedAgentWorkflow {
    fn name(&self) -> &str {
        "checkpointed_agent"
    }

    async fn run(&self, input: Value, ctx: &DurableContext) -> Result<Value, AgentError> {
        let prompt = input_str(&input, "prompt", DEFAULT_PROMPT)?;
        let gateway = &self.deps.gateway;
        let model = self.deps.model.as_str();
        let prompt_ref = prompt.as_str();

        let response: String = ctx
            .step("strands agent", move || gateway.converse_text(model, prompt_ref))
            .await?;
        Ok(json!({ "prompt": prompt, "response": response }))
    }
}
