//! human_review 工作流：模型抽取字段 → 挂起等待人工审核（默认 7 天超时）→ 按审核结论返回

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::durable::{DurableContext, WaitForCallbackOptions, Workflow};
use crate::tools::ReviewRequest;
use crate::workflow::{input_str, WorkflowDeps};

pub const DEFAULT_DOCUMENT: &str = "Sample invoice with amount $1,234.56";

const REVIEW_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// 审核方回传的结论
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReviewResult {
    pub approved: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

pub struct HumanReviewWorkflow {
    deps: WorkflowDeps,
    timeout: Duration,
}

impl HumanReviewWorkflow {
    pub fn new(deps: WorkflowDeps) -> Self {
        Self {
            deps,
            timeout: REVIEW_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Workflow for HumanReviewWorkflow {
    fn name(&self) -> &str {
        "human_review"
    }

    async fn run(&self, input: Value, ctx: &DurableContext) -> Result<Value, AgentError> {
        let document = input_str(&input, "document", DEFAULT_DOCUMENT)?;
        let gateway = &self.deps.gateway;
        let model = self.deps.model.as_str();

        let prompt = format!("Extract key fields from this document as JSON: \"{document}\"");
        let prompt_ref = prompt.as_str();
        let extracted_fields: String = ctx
            .step("extract fields", move || gateway.converse_text(model, prompt_ref))
            .await?;

        let notifier = Arc::clone(&self.deps.notifier);
        let request = ReviewRequest {
            token: String::new(),
            execution_id: ctx.execution_id().to_string(),
            subject: "document review".to_string(),
            details: json!({ "document": document, "extractedFields": extracted_fields }),
        };
        let reply = ctx
            .wait_for_callback(
                "Await Human review",
                move |token| async move {
                    let request = ReviewRequest { token, ..request };
                    notifier.notify(&request).await
                },
                WaitForCallbackOptions::with_timeout(self.timeout),
            )
            .await?;

        let review: ReviewResult = serde_json::from_str(&reply)
            .map_err(|e| AgentError::InvalidInput(format!("review payload: {e}")))?;
        if !review.approved {
            return Ok(json!({
                "status": "rejected",
                "notes": review.notes,
                "extractedFields": extracted_fields,
            }));
        }
        Ok(json!({ "status": "approved", "extractedFields": extracted_fields }))
    }
}
