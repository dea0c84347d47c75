//! structured_output 工作流：单个 step 内调用模型并解析联系人 JSON；解析失败由 step 重试重新调用模型

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::durable::{DurableContext, Workflow};
use crate::llm::InferenceGateway;
use crate::workflow::{input_str, WorkflowDeps};

pub const DEFAULT_TEXT: &str = "John Smith from Acme Corp, email: john@acme.com";

/// 抽取出的联系人
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContact {
    pub name: String,
    pub email: String,
    pub company: String,
}

/// 从模型回复中取第一个不含嵌套的 `{...}` 并解析
pub fn parse_contact(raw: &str) -> Result<ExtractedContact, AgentError> {
    let re = Regex::new(r"\{[^}]+\}").map_err(|e| AgentError::Config(e.to_string()))?;
    let m = re
        .find(raw)
        .ok_or_else(|| AgentError::MalformedResponse("No JSON found in response".to_string()))?;
    serde_json::from_str(m.as_str())
        .map_err(|e| AgentError::MalformedResponse(format!("contact JSON: {e}")))
}

async fn extract_contact(
    gateway: &InferenceGateway,
    model: &str,
    text: &str,
) -> Result<ExtractedContact, AgentError> {
    let raw = gateway
        .converse_text(
            model,
            &format!("Extract contact info as JSON with keys \"name\", \"email\", \"company\": {text}"),
        )
        .await?;
    parse_contact(&raw)
}

pub struct StructuredOutputWorkflow {
    deps: WorkflowDeps,
}

impl StructuredOutputWorkflow {
    pub fn new(deps: WorkflowDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Workflow for StructuredOutputWorkflow {
    fn name(&self) -> &str {
        "structured_output"
    }

    async fn run(&self, input: Value, ctx: &DurableContext) -> Result<Value, AgentError> {
        let text = input_str(&input, "text", DEFAULT_TEXT)?;
        let gateway = &self.deps.gateway;
        let model = self.deps.small_model.as_str();
        let text_ref = text.as_str();

        let contact: ExtractedContact = ctx
            .step("extract", move || extract_contact(gateway, model, text_ref))
            .await?;
        Ok(json!({
            "name": contact.name,
            "email": contact.email,
            "company": contact.company,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_contact() {
        let c = parse_contact(
            "Here you go: {\"name\": \"John Smith\", \"email\": \"john@acme.com\", \"company\": \"Acme Corp\"}",
        )
        .unwrap();
        assert_eq!(c.name, "John Smith");
        assert_eq!(c.company, "Acme Corp");
    }

    #[test]
    fn test_parse_contact_rejects_missing_json_and_fields() {
        assert!(parse_contact("no json").is_err());
        assert!(parse_contact("{\"name\": \"x\"}").is_err());
    }
}
