//! 人工审核工具：wait_for_human_review
//!
//! 登记回调记录后把 token 交给通知方（日志 / 消息 / 邮件），然后挂起整个工作流；
//! 外部信号（审核结论文本）到达并重放后，工具返回该文本。超时变为 CallbackTimeout，
//! 由派发器转成错误 ToolResult 反馈给模型。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::Value;

use crate::core::AgentError;
use crate::durable::{DurableContext, WaitForCallbackOptions};
use crate::memory::ToolInput;
use crate::tools::{input_schema_for, Tool};

/// 一次审核请求（交给通知方）
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub token: String,
    pub execution_id: String,
    pub subject: String,
    pub details: Value,
}

/// 回调通知方：把 token 发给外部审核系统
#[async_trait]
pub trait CallbackNotifier: Send + Sync {
    async fn notify(&self, request: &ReviewRequest) -> Result<(), AgentError>;
}

/// 默认通知方：只写日志。token 不在 info 级输出，调用方从挂起结果中获取
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl CallbackNotifier for LogNotifier {
    async fn notify(&self, request: &ReviewRequest) -> Result<(), AgentError> {
        tracing::info!(
            execution_id = %request.execution_id,
            subject = %request.subject,
            details = %request.details,
            "Review needed"
        );
        tracing::debug!(token = %request.token, "review callback registered");
        Ok(())
    }
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct ReviewInput {
    /// 需要人工确认的问题
    question: String,
}

/// 请求人工审核并等待结论
pub struct WaitForHumanReviewTool {
    notifier: Arc<dyn CallbackNotifier>,
    options: WaitForCallbackOptions,
}

impl WaitForHumanReviewTool {
    pub fn new(notifier: Arc<dyn CallbackNotifier>) -> Self {
        Self {
            notifier,
            options: WaitForCallbackOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WaitForCallbackOptions) -> Self {
        self.options = options;
        self
    }
}

impl Default for WaitForHumanReviewTool {
    fn default() -> Self {
        Self::new(Arc::new(LogNotifier))
    }
}

#[async_trait]
impl Tool for WaitForHumanReviewTool {
    fn name(&self) -> &str {
        "wait_for_human_review"
    }

    fn description(&self) -> &str {
        "Request human review and wait for response. Use when you need human approval or input."
    }

    fn input_schema(&self) -> Value {
        input_schema_for::<ReviewInput>()
    }

    async fn execute(&self, input: &ToolInput, ctx: &DurableContext) -> Result<String, AgentError> {
        let question = input.get("question").cloned().unwrap_or_default();
        let notifier = Arc::clone(&self.notifier);
        let execution_id = ctx.execution_id().to_string();
        let answer = ctx
            .wait_for_callback(
                "human_review",
                move |token| async move {
                    let request = ReviewRequest {
                        token,
                        execution_id,
                        subject: "wait_for_human_review".to_string(),
                        details: serde_json::json!({ "question": question }),
                    };
                    notifier.notify(&request).await
                },
                self.options.clone(),
            )
            .await?;
        Ok(answer)
    }
}
