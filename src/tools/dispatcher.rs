//! 工具派发器
//!
//! 对每个 ToolRequest：在注册表中解析工具，在独立的检查点子单元（`tool:{name}:{id}`）内执行，
//! 把输出转为携带原请求 id 的 ToolResult。未知工具与工具内部错误都转成错误结果反馈给模型；
//! 挂起信号原样上抛，不写入子单元记录。每次派发输出一条结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;

use crate::core::{AgentError, TaskScheduler};
use crate::durable::DurableContext;
use crate::memory::{ContentBlock, ToolInput, ToolRequest};
use crate::tools::ToolRegistry;

/// 工具派发器：持有注册表与并发池
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    scheduler: TaskScheduler,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            scheduler: TaskScheduler::default(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 子单元名，由工具名与调用 id 决定，重放时据此找回同一检查点
    pub fn unit_name(request: &ToolRequest) -> String {
        format!("tool:{}:{}", request.name, request.id)
    }

    /// 派发一次工具调用，返回 ToolResult 内容块。
    /// Err 只会是挂起信号或检查点存储自身的错误
    pub async fn dispatch(
        &self,
        ctx: &DurableContext,
        request: &ToolRequest,
    ) -> Result<ContentBlock, AgentError> {
        let start = Instant::now();
        let tool = match self.registry.resolve(&request.name) {
            Ok(tool) => tool,
            Err(e) => {
                tracing::warn!(tool = %request.name, tool_use_id = %request.id, "model requested unknown tool");
                audit(request, "unknown_tool", start);
                return Ok(ContentBlock::tool_error(&request.id, e));
            }
        };

        let _permit = self.scheduler.acquire_tool().await;
        let id = request.id.clone();
        let input = request.input.clone();
        let outcome = ctx
            .child_context(&Self::unit_name(request), move |child| async move {
                match tool.execute(&input, &child).await {
                    Ok(output) => Ok(ContentBlock::tool_result(id, output)),
                    Err(e) if e.is_suspension() => Err(e),
                    Err(e) => Ok(ContentBlock::tool_error(id, e)),
                }
            })
            .await;

        let label = match &outcome {
            Ok(ContentBlock::ToolResult(res)) if res.is_error => "error",
            Ok(_) => "ok",
            Err(e) if e.is_suspension() => "suspended",
            Err(_) => "failed",
        };
        audit(request, label, start);
        outcome
    }

    /// 并发派发一轮内的全部请求，结果与请求一一对应、顺序相同。
    /// 所有单元都跑完后，若有任一挂起则整体挂起
    pub async fn dispatch_all(
        &self,
        ctx: &DurableContext,
        requests: &[&ToolRequest],
    ) -> Result<Vec<ContentBlock>, AgentError> {
        let finished = join_all(requests.iter().map(|req| self.dispatch(ctx, req))).await;

        let mut results = Vec::with_capacity(finished.len());
        let mut suspension = None;
        for outcome in finished {
            match outcome {
                Ok(block) => results.push(block),
                Err(e) if e.is_suspension() => {
                    if suspension.is_none() {
                        suspension = Some(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        match suspension {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

fn audit(request: &ToolRequest, outcome: &str, start: Instant) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": request.name,
        "tool_use_id": request.id,
        "ok": outcome == "ok",
        "outcome": outcome,
        "duration_ms": start.elapsed().as_millis() as u64,
        "args_preview": args_preview(&request.input),
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}

fn args_preview(input: &ToolInput) -> String {
    let s = serde_json::to_string(input).unwrap_or_default();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
