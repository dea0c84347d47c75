//! prompt_chaining 工作流：两个顺序 step，第二步以第一步的输出为输入

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::durable::{DurableContext, Workflow};
use crate::workflow::{input_str, WorkflowDeps};

pub struct PromptChainingWorkflow {
    deps: WorkflowDeps,
}

impl PromptChainingWorkflow {
    pub fn new(deps: WorkflowDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Workflow for PromptChainingWorkflow {
    fn name(&self) -> &str {
        "prompt_chaining"
    }

    async fn run(&self, input: Value, ctx: &DurableContext) -> Result<Value, AgentError> {
        let topic = input_str(&input, "topic", "programming")?;
        let gateway = &self.deps.gateway;
        let model = self.deps.small_model.as_str();

        let joke_prompt = format!("Make a joke about {topic}");
        let joke_prompt = joke_prompt.as_str();
        let joke: String = ctx
            .step("generate joke", move || gateway.converse_text(model, joke_prompt))
            .await?;

        let review_prompt = format!("Rate this joke 1-10 and explain why: \"{joke}\"");
        let review_prompt = review_prompt.as_str();
        let review: String = ctx
            .step("review joke", move || gateway.converse_text(model, review_prompt))
            .await?;

        Ok(json!({ "joke": joke, "review": review }))
    }
}
