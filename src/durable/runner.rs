//! 工作流运行器
//!
//! start 创建执行记录并运行处理函数；处理函数因等待回调而挂起时记录 Suspended 状态并返回待决 token；
//! 外部信号通过 send_callback_* 写入回调记录，随后 resume 从头重放处理函数，
//! 已记录的 step / 子单元直接返回记录值，直到越过上次挂起点继续执行。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::core::AgentError;
use crate::durable::checkpoint::{
    CallbackRecord, CallbackResolution, Checkpoint, ExecutionRecord, ExecutionStatus,
};
use crate::durable::{CheckpointStore, ContextOptions, DurableContext, DurableError};

/// 工作流处理函数：输入 JSON，返回 JSON（纯字符串或结构化对象由处理函数决定）
#[async_trait]
pub trait Workflow: Send + Sync {
    /// 注册名（CLI / HTTP 用此名启动）
    fn name(&self) -> &str;

    async fn run(&self, input: Value, ctx: &DurableContext) -> Result<Value, AgentError>;
}

/// 单次运行（start / resume）的结局
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded { result: Value },
    Failed { error: String },
    /// 等待外部回调；pending 为尚未决的 token
    Suspended { pending: Vec<String> },
}

/// 运行结果：执行 id + 结局
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    pub execution_id: String,
    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
}

impl Execution {
    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            ExecutionOutcome::Succeeded { result } => Some(result),
            _ => None,
        }
    }

    pub fn pending_tokens(&self) -> &[String] {
        match &self.outcome {
            ExecutionOutcome::Suspended { pending } => pending,
            _ => &[],
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Suspended { .. })
    }
}

/// 工作流运行器：持有检查点存储与已注册工作流
pub struct DurableRunner {
    store: Arc<dyn CheckpointStore>,
    options: ContextOptions,
    workflows: HashMap<String, Arc<dyn Workflow>>,
    /// 正在运行的执行，防止同一执行被并发重放
    active: Mutex<HashSet<String>>,
}

impl DurableRunner {
    pub fn new(store: Arc<dyn CheckpointStore>, options: ContextOptions) -> Self {
        Self {
            store,
            options,
            workflows: HashMap::new(),
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn register(&mut self, workflow: impl Workflow + 'static) {
        self.register_arc(Arc::new(workflow));
    }

    pub fn register_arc(&mut self, workflow: Arc<dyn Workflow>) {
        self.workflows
            .insert(workflow.name().to_string(), workflow);
    }

    /// 已注册工作流名（排序后）
    pub fn workflow_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// 启动新执行
    pub async fn start(&self, workflow: &str, input: Value) -> Result<Execution, DurableError> {
        if !self.workflows.contains_key(workflow) {
            return Err(DurableError::UnknownWorkflow {
                name: workflow.to_string(),
            });
        }
        let record = ExecutionRecord::new(workflow, input);
        self.store.save_execution(&record).await?;
        tracing::info!(execution_id = %record.id, workflow, "execution started");
        self.drive(record).await
    }

    /// 恢复执行（Running：进程崩溃后重放；Suspended：回调到达后继续）
    pub async fn resume(&self, execution_id: &str) -> Result<Execution, DurableError> {
        let record = self
            .store
            .load_execution(execution_id)
            .await?
            .ok_or_else(|| DurableError::UnknownExecution {
                id: execution_id.to_string(),
            })?;
        if !record.is_resumable() {
            return Err(DurableError::NotResumable {
                id: record.id,
                status: record.status.to_string(),
            });
        }
        tracing::info!(execution_id, "execution resumed");
        self.drive(record).await
    }

    /// 外部信号：回调成功，payload 原样交给挂起的操作
    pub async fn send_callback_success(
        &self,
        token: &str,
        payload: impl Into<String>,
    ) -> Result<CallbackRecord, DurableError> {
        let record = self
            .store
            .resolve_callback(token, CallbackResolution::Success(payload.into()))
            .await?;
        tracing::info!(execution_id = %record.execution_id, operation_id = %record.operation_id, "callback succeeded");
        Ok(record)
    }

    /// 外部信号：回调失败
    pub async fn send_callback_failure(
        &self,
        token: &str,
        error: impl Into<String>,
    ) -> Result<CallbackRecord, DurableError> {
        let record = self
            .store
            .resolve_callback(token, CallbackResolution::Failure(error.into()))
            .await?;
        tracing::info!(execution_id = %record.execution_id, operation_id = %record.operation_id, "callback failed");
        Ok(record)
    }

    /// 写入信号后立即恢复所属执行。
    /// 信号晚于截止时间时回调已记为超时：仍恢复执行，让等待方按超时结局继续；执行已不可恢复时返回 CallbackTimeout
    pub async fn signal_and_resume(
        &self,
        token: &str,
        resolution: CallbackResolution,
    ) -> Result<Execution, DurableError> {
        let signalled = match resolution {
            CallbackResolution::Success(payload) => self.send_callback_success(token, payload).await,
            CallbackResolution::Failure(error) => self.send_callback_failure(token, error).await,
        };
        match signalled {
            Ok(record) => self.resume(&record.execution_id).await,
            Err(DurableError::CallbackTimeout { token }) => {
                let record = self.store.load_callback(&token).await?.ok_or_else(|| {
                    DurableError::UnknownCallback {
                        token: token.clone(),
                    }
                })?;
                let suspended = self
                    .store
                    .load_execution(&record.execution_id)
                    .await?
                    .is_some_and(|e| e.status == ExecutionStatus::Suspended);
                if !suspended {
                    return Err(DurableError::CallbackTimeout { token });
                }
                tracing::warn!(
                    execution_id = %record.execution_id,
                    token = %token,
                    "late callback signal, resuming into timeout"
                );
                self.resume(&record.execution_id).await
            }
            Err(e) => Err(e),
        }
    }

    /// 恢复所有「挂起且有已过期待决回调」的执行，返回本次恢复的结果。
    /// 单个执行恢复失败只记日志，不影响其余执行
    pub async fn resume_expired(&self) -> Result<Vec<Execution>, DurableError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut resumed = Vec::new();
        for record in self.store.executions().await? {
            if record.status != ExecutionStatus::Suspended {
                continue;
            }
            let expired = self
                .store
                .callbacks_for(&record.id)
                .await?
                .iter()
                .any(|cb| cb.is_pending() && cb.is_expired_at(now_ms));
            if !expired {
                continue;
            }
            match self.resume(&record.id).await {
                Ok(execution) => resumed.push(execution),
                Err(e) => {
                    tracing::warn!(execution_id = %record.id, error = %e, "expired execution not resumed")
                }
            }
        }
        if !resumed.is_empty() {
            tracing::info!(count = resumed.len(), "resumed executions with expired callbacks");
        }
        Ok(resumed)
    }

    pub async fn execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>, DurableError> {
        self.store.load_execution(execution_id).await
    }

    pub async fn operations(
        &self,
        execution_id: &str,
    ) -> Result<Vec<(String, Checkpoint)>, DurableError> {
        self.store.operations(execution_id).await
    }

    async fn drive(&self, mut record: ExecutionRecord) -> Result<Execution, DurableError> {
        let workflow = self
            .workflows
            .get(&record.workflow)
            .cloned()
            .ok_or_else(|| DurableError::UnknownWorkflow {
                name: record.workflow.clone(),
            })?;

        if !self.active.lock().await.insert(record.id.clone()) {
            return Err(DurableError::NotResumable {
                id: record.id,
                status: "already running".to_string(),
            });
        }
        let result = self.drive_inner(workflow.as_ref(), &mut record).await;
        self.active.lock().await.remove(&record.id);
        result
    }

    async fn drive_inner(
        &self,
        workflow: &dyn Workflow,
        record: &mut ExecutionRecord,
    ) -> Result<Execution, DurableError> {
        record.status = ExecutionStatus::Running;
        record.updated_at = chrono::Utc::now().timestamp_millis();
        self.store.save_execution(record).await?;

        let ctx = DurableContext::new(record.id.clone(), self.store.clone(), self.options.clone());
        let outcome = match workflow.run(record.input.clone(), &ctx).await {
            Ok(result) => {
                record.status = ExecutionStatus::Succeeded;
                record.result = Some(result.clone());
                tracing::info!(execution_id = %record.id, "execution succeeded");
                ExecutionOutcome::Succeeded { result }
            }
            Err(e) if e.is_suspension() => {
                record.status = ExecutionStatus::Suspended;
                let pending: Vec<String> = self
                    .store
                    .callbacks_for(&record.id)
                    .await?
                    .into_iter()
                    .filter(|cb| cb.is_pending())
                    .map(|cb| cb.token)
                    .collect();
                tracing::info!(execution_id = %record.id, pending = pending.len(), "execution suspended");
                ExecutionOutcome::Suspended { pending }
            }
            Err(e) => {
                record.status = ExecutionStatus::Failed;
                record.error = Some(e.to_string());
                tracing::error!(execution_id = %record.id, error = %e, "execution failed");
                ExecutionOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        record.updated_at = chrono::Utc::now().timestamp_millis();
        self.store.save_execution(record).await?;

        Ok(Execution {
            execution_id: record.id.clone(),
            outcome,
        })
    }
}
