//! 文件检查点存储
//!
//! 每个执行一个 JSON 文件（执行记录 + 操作列表），每个回调 token 一个 JSON 文件；
//! 进程重启后可从同一目录恢复挂起的执行。写入先落临时文件再 rename。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::durable::checkpoint::{
    CallbackRecord, CallbackResolution, CallbackState, Checkpoint, ExecutionRecord,
};
use crate::durable::store::{apply_resolution, upsert_operation, CheckpointStore};
use crate::durable::DurableError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ExecutionDocument {
    execution: Option<ExecutionRecord>,
    #[serde(default)]
    operations: Vec<(String, Checkpoint)>,
}

/// 基于目录的检查点存储
#[derive(Debug)]
pub struct FileCheckpointStore {
    root: PathBuf,
    /// 进程内串行化读-改-写
    lock: Mutex<()>,
}

impl FileCheckpointStore {
    /// 创建存储；目录不存在时自动创建
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, DurableError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join("callbacks")).await?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn execution_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize(id)))
    }

    fn callback_path(&self, token: &str) -> PathBuf {
        self.root
            .join("callbacks")
            .join(format!("{}.json", sanitize(token)))
    }

    async fn read_document(&self, id: &str) -> Result<ExecutionDocument, DurableError> {
        read_json::<ExecutionDocument>(&self.execution_path(id))
            .await
            .map(Option::unwrap_or_default)
    }

    async fn write_document(&self, id: &str, doc: &ExecutionDocument) -> Result<(), DurableError> {
        write_json(&self.execution_path(id), doc).await
    }
}

/// token / id 只允许字母数字与 `_-`，避免路径逃逸
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, DurableError> {
    match tokio::fs::read_to_string(path).await {
        Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DurableError> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_string_pretty(value)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), DurableError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document(&record.id).await?;
        doc.execution = Some(record.clone());
        self.write_document(&record.id, &doc).await
    }

    async fn load_execution(&self, id: &str) -> Result<Option<ExecutionRecord>, DurableError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document(id).await?.execution)
    }

    async fn executions(&self) -> Result<Vec<ExecutionRecord>, DurableError> {
        let _guard = self.lock.lock().await;
        let mut records = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(doc) = read_json::<ExecutionDocument>(&path).await? {
                records.extend(doc.execution);
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn load_operation(
        &self,
        execution_id: &str,
        operation_id: &str,
    ) -> Result<Option<Checkpoint>, DurableError> {
        let _guard = self.lock.lock().await;
        let doc = self.read_document(execution_id).await?;
        Ok(doc
            .operations
            .into_iter()
            .find(|(id, _)| id == operation_id)
            .map(|(_, cp)| cp))
    }

    async fn save_operation(
        &self,
        execution_id: &str,
        operation_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), DurableError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document(execution_id).await?;
        upsert_operation(&mut doc.operations, operation_id, checkpoint);
        self.write_document(execution_id, &doc).await
    }

    async fn operations(
        &self,
        execution_id: &str,
    ) -> Result<Vec<(String, Checkpoint)>, DurableError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document(execution_id).await?.operations)
    }

    async fn register_callback(&self, record: &CallbackRecord) -> Result<(), DurableError> {
        let _guard = self.lock.lock().await;
        write_json(&self.callback_path(&record.token), record).await
    }

    async fn load_callback(&self, token: &str) -> Result<Option<CallbackRecord>, DurableError> {
        let _guard = self.lock.lock().await;
        read_json(&self.callback_path(token)).await
    }

    async fn resolve_callback(
        &self,
        token: &str,
        resolution: CallbackResolution,
    ) -> Result<CallbackRecord, DurableError> {
        let _guard = self.lock.lock().await;
        let path = self.callback_path(token);
        let mut record: CallbackRecord =
            read_json(&path)
                .await?
                .ok_or_else(|| DurableError::UnknownCallback {
                    token: token.to_string(),
                })?;
        let before = record.state.clone();
        let outcome = apply_resolution(&mut record, resolution, chrono::Utc::now().timestamp_millis());
        if record.state != before {
            write_json(&path, &record).await?;
        }
        outcome.map(|()| record)
    }

    async fn expire_callback(&self, token: &str) -> Result<CallbackRecord, DurableError> {
        let _guard = self.lock.lock().await;
        let path = self.callback_path(token);
        let mut record: CallbackRecord =
            read_json(&path)
                .await?
                .ok_or_else(|| DurableError::UnknownCallback {
                    token: token.to_string(),
                })?;
        if record.is_pending() {
            record.state = CallbackState::TimedOut;
            write_json(&path, &record).await?;
        }
        Ok(record)
    }

    async fn callbacks_for(&self, execution_id: &str) -> Result<Vec<CallbackRecord>, DurableError> {
        let _guard = self.lock.lock().await;
        let mut records = Vec::new();
        let mut dir = tokio::fs::read_dir(self.root.join("callbacks")).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = read_json::<CallbackRecord>(&path).await? {
                if record.execution_id == execution_id {
                    records.push(record);
                }
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}
