//! parallel_invocation 工作流：同一主题的多个提示并行调用，结果与提示一一对应

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::durable::{DurableContext, Workflow};
use crate::workflow::{input_str, WorkflowDeps};

pub const PROMPTS: [&str; 3] = [
    "Explain the benefits of",
    "Describe the challenges of",
    "Summarize the future of",
];

/// 单个视角：提示前缀 + 模型回复
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perspective {
    pub prompt: String,
    pub response: String,
}

pub struct ParallelInvocationWorkflow {
    deps: WorkflowDeps,
}

impl ParallelInvocationWorkflow {
    pub fn new(deps: WorkflowDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Workflow for ParallelInvocationWorkflow {
    fn name(&self) -> &str {
        "parallel_invocation"
    }

    async fn run(&self, input: Value, ctx: &DurableContext) -> Result<Value, AgentError> {
        let topic = input_str(&input, "topic", "artificial intelligence")?;
        let gateway = &self.deps.gateway;
        let model = self.deps.small_model.as_str();
        let topic_ref = topic.as_str();

        let result = ctx
            .map_with_namer(
                "Get perspectives",
                PROMPTS.to_vec(),
                |_, i| format!("prompt-{i}"),
                move |_child, prompt: &'static str, _| async move {
                    let response = gateway
                        .converse_text(model, &format!("{prompt} {topic_ref}"))
                        .await?;
                    Ok::<_, AgentError>(Perspective {
                        prompt: prompt.to_string(),
                        response,
                    })
                },
            )
            .await?;

        if let Some((name, error)) = result.first_failure() {
            return Err(AgentError::InferenceFailed(format!("{name}: {error}")));
        }
        Ok(json!({ "topic": topic, "perspectives": result.into_results() }))
    }
}
