//! Agent 循环
//!
//! 每轮：检查点 step 内调用推理网关 → 追加模型回复 → Terminal 则取第一个文本块返回（没有则空串）；
//! 否则并发派发本轮全部工具请求，按请求顺序把结果作为一个 user Turn 追加，进入下一轮。
//! 对话记录只在这条控制线程上追加；挂起信号原样上抛给运行器，回调到达后整个循环从头重放。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, LoopState, TaskScheduler};
use crate::durable::{DurableContext, DurableError};
use crate::llm::{InferenceGateway, InferenceResponse, StopKind};
use crate::memory::{ContentBlock, Transcript, Turn};
use crate::react::LoopEvent;
use crate::tools::{ToolDispatcher, ToolRegistry};

/// 一次循环运行的结果：最终文本 + 完整对话记录
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRun {
    pub result: String,
    pub transcript: Transcript,
}

/// Agent 循环：持有网关、派发器与模型 id
pub struct AgentLoop {
    gateway: InferenceGateway,
    dispatcher: ToolDispatcher,
    model_id: String,
    events: Option<UnboundedSender<LoopEvent>>,
}

impl AgentLoop {
    pub fn new(
        gateway: InferenceGateway,
        registry: Arc<ToolRegistry>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            dispatcher: ToolDispatcher::new(registry),
            model_id: model_id.into(),
            events: None,
        }
    }

    /// 指定工具并发池
    pub fn with_scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.dispatcher = self.dispatcher.with_scheduler(scheduler);
        self
    }

    /// 挂接过程事件通道
    pub fn with_events(mut self, tx: UnboundedSender<LoopEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn emit(&self, event: LoopEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn transition(&self, state: &mut LoopState, next: LoopState) {
        debug_assert!(
            state.can_transition_to(next),
            "invalid loop transition {state} -> {next}"
        );
        *state = next;
        self.emit(LoopEvent::StateChanged { state: next });
    }

    /// 从初始提示运行到 Terminal
    pub async fn run(&self, ctx: &DurableContext, prompt: &str) -> Result<AgentRun, AgentError> {
        let catalog = self.dispatcher.registry().describe_all();
        let mut transcript = Transcript::with_prompt(prompt);
        let mut state = LoopState::AwaitingInference;
        self.emit(LoopEvent::StateChanged { state });

        loop {
            let response = self.infer(ctx, &transcript, &catalog).await?;
            self.emit(LoopEvent::InferenceCompleted {
                stop_kind: response.stop_kind,
            });
            let InferenceResponse { stop_kind, message } = response;
            transcript.push(message);
            let Some(turn) = transcript.last() else {
                return Err(AgentError::MalformedResponse("empty transcript".to_string()));
            };

            if stop_kind == StopKind::Terminal {
                let result = turn.first_text().unwrap_or_default().to_string();
                self.transition(&mut state, LoopState::Terminal);
                tracing::info!(
                    execution_id = %ctx.execution_id(),
                    turns = transcript.len(),
                    "agent loop finished"
                );
                self.emit(LoopEvent::Finished {
                    text: result.clone(),
                });
                return Ok(AgentRun { result, transcript });
            }

            let requests = turn.tool_requests();
            if requests.is_empty() {
                return Err(AgentError::MalformedResponse(
                    "tool use requested without any tool request blocks".to_string(),
                ));
            }
            self.transition(&mut state, LoopState::DispatchingTools);
            for req in &requests {
                self.emit(LoopEvent::ToolDispatched {
                    tool: req.name.clone(),
                    id: req.id.clone(),
                });
            }

            let results = match self.dispatcher.dispatch_all(ctx, &requests).await {
                Ok(results) => results,
                Err(AgentError::Durable(DurableError::Suspended { token })) => {
                    self.transition(&mut state, LoopState::Suspended);
                    self.emit(LoopEvent::Suspended {
                        token: token.clone(),
                    });
                    return Err(DurableError::Suspended { token }.into());
                }
                Err(e) => return Err(e),
            };
            for (req, block) in requests.iter().zip(&results) {
                if let ContentBlock::ToolResult(res) = block {
                    self.emit(LoopEvent::ToolCompleted {
                        tool: req.name.clone(),
                        id: res.id.clone(),
                        is_error: res.is_error,
                    });
                }
            }

            transcript.push(Turn::user(results));
            self.transition(&mut state, LoopState::AwaitingInference);
        }
    }

    /// 检查点 step 内的一次推理调用；重试耗尽后归类为 InferenceFailed
    async fn infer(
        &self,
        ctx: &DurableContext,
        transcript: &Transcript,
        catalog: &[crate::tools::ToolDescriptor],
    ) -> Result<InferenceResponse, AgentError> {
        let gateway = &self.gateway;
        let model_id = self.model_id.as_str();
        ctx.step("converse", move || async move {
            gateway.try_converse(model_id, transcript, catalog).await
        })
        .await
        .map_err(|e| match e {
            DurableError::StepFailed { message, .. } => AgentError::InferenceFailed(message),
            other => AgentError::Durable(other),
        })
    }
}
