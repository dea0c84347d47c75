//! 检查点存储抽象层
//!
//! 定义执行记录、操作检查点、回调记录的统一存取接口；内存实现用于测试与单进程运行，
//! 文件实现（file_store）可跨进程重启恢复。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::durable::checkpoint::{
    CallbackRecord, CallbackResolution, CallbackState, Checkpoint, ExecutionRecord,
};
use crate::durable::DurableError;

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 写入（或覆盖）执行记录
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), DurableError>;

    async fn load_execution(&self, id: &str) -> Result<Option<ExecutionRecord>, DurableError>;

    /// 全部执行记录，按创建时间排序
    async fn executions(&self) -> Result<Vec<ExecutionRecord>, DurableError>;

    async fn load_operation(
        &self,
        execution_id: &str,
        operation_id: &str,
    ) -> Result<Option<Checkpoint>, DurableError>;

    /// 写入操作检查点；同一 operation_id 再次写入时覆盖
    async fn save_operation(
        &self,
        execution_id: &str,
        operation_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), DurableError>;

    /// 按首次写入顺序列出执行的全部操作
    async fn operations(&self, execution_id: &str)
        -> Result<Vec<(String, Checkpoint)>, DurableError>;

    async fn register_callback(&self, record: &CallbackRecord) -> Result<(), DurableError>;

    async fn load_callback(&self, token: &str) -> Result<Option<CallbackRecord>, DurableError>;

    /// 原子地消费一次外部信号：重复信号返回 AlreadyResolved，过期返回 CallbackTimeout
    async fn resolve_callback(
        &self,
        token: &str,
        resolution: CallbackResolution,
    ) -> Result<CallbackRecord, DurableError>;

    /// 若仍为 Pending 则标记为 TimedOut，返回最新记录
    async fn expire_callback(&self, token: &str) -> Result<CallbackRecord, DurableError>;

    async fn callbacks_for(&self, execution_id: &str) -> Result<Vec<CallbackRecord>, DurableError>;
}

/// 对回调记录应用一次信号。无论返回 Ok 还是 Err，调用方都需持久化 `record`（超时会改写状态）
pub(crate) fn apply_resolution(
    record: &mut CallbackRecord,
    resolution: CallbackResolution,
    now_ms: i64,
) -> Result<(), DurableError> {
    match record.state {
        CallbackState::Pending => {}
        CallbackState::TimedOut => {
            return Err(DurableError::CallbackTimeout {
                token: record.token.clone(),
            })
        }
        _ => {
            return Err(DurableError::AlreadyResolved {
                token: record.token.clone(),
            })
        }
    }
    if record.is_expired_at(now_ms) {
        record.state = CallbackState::TimedOut;
        return Err(DurableError::CallbackTimeout {
            token: record.token.clone(),
        });
    }
    record.state = match resolution {
        CallbackResolution::Success(payload) => CallbackState::Succeeded { payload },
        CallbackResolution::Failure(error) => CallbackState::Failed { error },
    };
    Ok(())
}

pub(crate) fn upsert_operation(
    ops: &mut Vec<(String, Checkpoint)>,
    operation_id: &str,
    checkpoint: &Checkpoint,
) {
    match ops.iter_mut().find(|(id, _)| id == operation_id) {
        Some((_, existing)) => *existing = checkpoint.clone(),
        None => ops.push((operation_id.to_string(), checkpoint.clone())),
    }
}

/// 内存检查点存储
#[derive(Default)]
pub struct MemoryCheckpointStore {
    executions: RwLock<HashMap<String, ExecutionRecord>>,
    operations: RwLock<HashMap<String, Vec<(String, Checkpoint)>>>,
    callbacks: RwLock<HashMap<String, CallbackRecord>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), DurableError> {
        self.executions
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load_execution(&self, id: &str) -> Result<Option<ExecutionRecord>, DurableError> {
        Ok(self.executions.read().await.get(id).cloned())
    }

    async fn executions(&self) -> Result<Vec<ExecutionRecord>, DurableError> {
        let mut records: Vec<ExecutionRecord> =
            self.executions.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn load_operation(
        &self,
        execution_id: &str,
        operation_id: &str,
    ) -> Result<Option<Checkpoint>, DurableError> {
        Ok(self
            .operations
            .read()
            .await
            .get(execution_id)
            .and_then(|ops| ops.iter().find(|(id, _)| id == operation_id))
            .map(|(_, cp)| cp.clone()))
    }

    async fn save_operation(
        &self,
        execution_id: &str,
        operation_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), DurableError> {
        let mut ops = self.operations.write().await;
        upsert_operation(
            ops.entry(execution_id.to_string()).or_default(),
            operation_id,
            checkpoint,
        );
        Ok(())
    }

    async fn operations(
        &self,
        execution_id: &str,
    ) -> Result<Vec<(String, Checkpoint)>, DurableError> {
        Ok(self
            .operations
            .read()
            .await
            .get(execution_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn register_callback(&self, record: &CallbackRecord) -> Result<(), DurableError> {
        self.callbacks
            .write()
            .await
            .insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn load_callback(&self, token: &str) -> Result<Option<CallbackRecord>, DurableError> {
        Ok(self.callbacks.read().await.get(token).cloned())
    }

    async fn resolve_callback(
        &self,
        token: &str,
        resolution: CallbackResolution,
    ) -> Result<CallbackRecord, DurableError> {
        let mut callbacks = self.callbacks.write().await;
        let record = callbacks
            .get_mut(token)
            .ok_or_else(|| DurableError::UnknownCallback {
                token: token.to_string(),
            })?;
        apply_resolution(record, resolution, chrono::Utc::now().timestamp_millis())?;
        Ok(record.clone())
    }

    async fn expire_callback(&self, token: &str) -> Result<CallbackRecord, DurableError> {
        let mut callbacks = self.callbacks.write().await;
        let record = callbacks
            .get_mut(token)
            .ok_or_else(|| DurableError::UnknownCallback {
                token: token.to_string(),
            })?;
        if record.is_pending() {
            record.state = CallbackState::TimedOut;
        }
        Ok(record.clone())
    }

    async fn callbacks_for(&self, execution_id: &str) -> Result<Vec<CallbackRecord>, DurableError> {
        let mut records: Vec<CallbackRecord> = self
            .callbacks
            .read()
            .await
            .values()
            .filter(|r| r.execution_id == execution_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}
