//! 持久化执行上下文
//!
//! 提供 step / child_context / map / wait_for_callback 四种原语：
//! - 每个操作获得确定性 id：`{父前缀}/{name}#{同名序号}`，重放时据此找回已记录结果；
//! - 已记录成功的操作直接返回记录值，不再调用闭包（不重复发起网络调用或副作用）；
//! - 子上下文拥有独立命名空间与序号计数，并发子单元之间不会争用 id；
//! - wait_for_callback 首次执行时登记回调并返回 `Suspended`，外部信号到达后重放才拿到数据。

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::durable::checkpoint::{CallbackRecord, CallbackResolution, CallbackState, Checkpoint};
use crate::durable::error::Suspension;
use crate::durable::{CheckpointStore, DurableError, RetryPolicy};

/// 上下文级配置：step 重试策略与回调默认超时
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub retry: RetryPolicy,
    pub callback_timeout: Option<Duration>,
}

/// wait_for_callback 的选项；timeout 为 None 时使用上下文默认值
#[derive(Debug, Clone, Default)]
pub struct WaitForCallbackOptions {
    pub timeout: Option<Duration>,
}

impl WaitForCallbackOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// map 单项结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MapOutcome<R> {
    Succeeded { value: R },
    Failed { error: String },
}

/// map 单项：保留输入下标
#[derive(Debug, Clone, PartialEq)]
pub struct MapItem<R> {
    pub index: usize,
    pub name: String,
    pub outcome: MapOutcome<R>,
}

/// map 结果：与输入一一对应、按输入顺序排列
#[derive(Debug, Clone, PartialEq)]
pub struct MapResult<R> {
    pub items: Vec<MapItem<R>>,
}

impl<R> MapResult<R> {
    /// 成功项（按输入顺序）
    pub fn results(&self) -> Vec<&R> {
        self.items
            .iter()
            .filter_map(|item| match &item.outcome {
                MapOutcome::Succeeded { value } => Some(value),
                MapOutcome::Failed { .. } => None,
            })
            .collect()
    }

    pub fn into_results(self) -> Vec<R> {
        self.items
            .into_iter()
            .filter_map(|item| match item.outcome {
                MapOutcome::Succeeded { value } => Some(value),
                MapOutcome::Failed { .. } => None,
            })
            .collect()
    }

    /// 第一个失败项的 (name, error)
    pub fn first_failure(&self) -> Option<(&str, &str)> {
        self.items.iter().find_map(|item| match &item.outcome {
            MapOutcome::Failed { error } => Some((item.name.as_str(), error.as_str())),
            MapOutcome::Succeeded { .. } => None,
        })
    }

    pub fn all_succeeded(&self) -> bool {
        self.items
            .iter()
            .all(|item| matches!(item.outcome, MapOutcome::Succeeded { .. }))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

struct Shared {
    execution_id: String,
    store: Arc<dyn CheckpointStore>,
    options: ContextOptions,
}

/// 持久化执行上下文（clone 后共享同一命名空间）
#[derive(Clone)]
pub struct DurableContext {
    shared: Arc<Shared>,
    prefix: String,
    counters: Arc<Mutex<HashMap<String, usize>>>,
}

impl std::fmt::Debug for DurableContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableContext")
            .field("execution_id", &self.shared.execution_id)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl DurableContext {
    /// 根上下文
    pub fn new(
        execution_id: impl Into<String>,
        store: Arc<dyn CheckpointStore>,
        options: ContextOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                execution_id: execution_id.into(),
                store,
                options,
            }),
            prefix: String::new(),
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.shared.execution_id
    }

    /// 当前命名空间前缀（根上下文为空串）
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.shared.store
    }

    fn next_operation_id(&self, name: &str) -> String {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let n = counters.entry(name.to_string()).or_insert(0);
        let id = format!("{}/{}#{}", self.prefix, name, n);
        *n += 1;
        id
    }

    fn child(&self, operation_id: &str) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            prefix: operation_id.to_string(),
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn load(&self, operation_id: &str) -> Result<Option<Checkpoint>, DurableError> {
        self.shared
            .store
            .load_operation(&self.shared.execution_id, operation_id)
            .await
    }

    async fn save(&self, operation_id: &str, checkpoint: &Checkpoint) -> Result<(), DurableError> {
        self.shared
            .store
            .save_operation(&self.shared.execution_id, operation_id, checkpoint)
            .await
    }

    /// 检查点 step：已记录则返回记录值；否则按重试策略执行 `f`，记录最终成功值或最终失败
    pub async fn step<T, E, F, Fut>(&self, name: &str, mut f: F) -> Result<T, DurableError>
    where
        T: Serialize + DeserializeOwned + Send,
        E: Display + Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let operation_id = self.next_operation_id(name);
        match self.load(&operation_id).await? {
            Some(Checkpoint::Succeeded { value }) => {
                tracing::debug!(
                    execution_id = %self.shared.execution_id,
                    operation_id = %operation_id,
                    "step replayed from checkpoint"
                );
                return Ok(serde_json::from_value(value)?);
            }
            Some(Checkpoint::Failed { error }) => {
                return Err(DurableError::StepFailed {
                    name: name.to_string(),
                    message: error,
                })
            }
            Some(Checkpoint::Waiting { .. } | Checkpoint::Resolved { .. }) => {
                return Err(DurableError::Store(format!(
                    "operation {operation_id} is a callback, not a step"
                )))
            }
            None => {}
        }

        let retry = &self.shared.options.retry;
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => {
                    let json = serde_json::to_value(&value)?;
                    self.save(&operation_id, &Checkpoint::Succeeded { value: json })
                        .await?;
                    return Ok(value);
                }
                Err(e) => {
                    let message = e.to_string();
                    if retry.should_retry(attempt) {
                        let delay = retry.delay_after(attempt);
                        tracing::warn!(
                            operation_id = %operation_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %message,
                            "step attempt failed, retrying"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        attempt += 1;
                        continue;
                    }
                    tracing::error!(
                        operation_id = %operation_id,
                        attempt,
                        error = %message,
                        "step failed, retries exhausted"
                    );
                    self.save(
                        &operation_id,
                        &Checkpoint::Failed {
                            error: message.clone(),
                        },
                    )
                    .await?;
                    return Err(DurableError::StepFailed {
                        name: name.to_string(),
                        message,
                    });
                }
            }
        }
    }

    /// 隔离子单元：`f` 拿到独立命名空间的子上下文；挂起信号原样上抛且不记录
    pub async fn child_context<T, E, F, Fut>(&self, name: &str, f: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send,
        E: From<DurableError> + Display + Suspension + Send,
        F: FnOnce(DurableContext) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let operation_id = self.next_operation_id(name);
        match self.load(&operation_id).await? {
            Some(Checkpoint::Succeeded { value }) => {
                tracing::debug!(operation_id = %operation_id, "child context replayed from checkpoint");
                return Ok(serde_json::from_value(value).map_err(DurableError::from)?);
            }
            Some(Checkpoint::Failed { error }) => {
                return Err(DurableError::ChildFailed {
                    name: name.to_string(),
                    message: error,
                }
                .into())
            }
            Some(Checkpoint::Waiting { .. } | Checkpoint::Resolved { .. }) => {
                return Err(DurableError::Store(format!(
                    "operation {operation_id} is a callback, not a child context"
                ))
                .into())
            }
            None => {}
        }

        let child = self.child(&operation_id);
        match f(child).await {
            Ok(value) => {
                let json = serde_json::to_value(&value).map_err(DurableError::from)?;
                self.save(&operation_id, &Checkpoint::Succeeded { value: json })
                    .await?;
                Ok(value)
            }
            Err(e) if e.is_suspension() => Err(e),
            Err(e) => {
                self.save(
                    &operation_id,
                    &Checkpoint::Failed {
                        error: e.to_string(),
                    },
                )
                .await?;
                Err(e)
            }
        }
    }

    /// 并行 map，单项命名为 `{name}-{index}`
    pub async fn map<I, R, E, F, Fut>(
        &self,
        name: &str,
        items: Vec<I>,
        f: F,
    ) -> Result<MapResult<R>, E>
    where
        I: Send,
        R: Serialize + DeserializeOwned + Send,
        E: From<DurableError> + Display + Suspension + Send,
        F: Fn(DurableContext, I, usize) -> Fut + Send + Sync,
        Fut: Future<Output = Result<R, E>> + Send,
    {
        let prefix = name.to_string();
        self.map_with_namer(name, items, move |_, i| format!("{prefix}-{i}"), f)
            .await
    }

    /// 并行 map：每项一个检查点子单元，全部完成后按输入顺序返回。
    /// 单项失败只影响该项；任一项挂起则在兄弟项跑完后整体挂起
    pub async fn map_with_namer<I, R, E, N, F, Fut>(
        &self,
        name: &str,
        items: Vec<I>,
        namer: N,
        f: F,
    ) -> Result<MapResult<R>, E>
    where
        I: Send,
        R: Serialize + DeserializeOwned + Send,
        E: From<DurableError> + Display + Suspension + Send,
        N: Fn(&I, usize) -> String + Send + Sync,
        F: Fn(DurableContext, I, usize) -> Fut + Send + Sync,
        Fut: Future<Output = Result<R, E>> + Send,
    {
        let batch_id = self.next_operation_id(name);
        let batch = self.child(&batch_id);
        let f = &f;
        let batch_ref = &batch;

        let units = items.into_iter().enumerate().map(|(index, item)| {
            let item_name = namer(&item, index);
            async move {
                let outcome = batch_ref
                    .child_context(&item_name, |ctx| async move {
                        match f(ctx, item, index).await {
                            Ok(value) => Ok(MapOutcome::Succeeded { value }),
                            Err(e) if e.is_suspension() => Err(e),
                            Err(e) => Ok(MapOutcome::Failed {
                                error: e.to_string(),
                            }),
                        }
                    })
                    .await;
                (index, item_name, outcome)
            }
        });
        let finished = join_all(units).await;

        let mut suspension: Option<E> = None;
        let mut results = Vec::with_capacity(finished.len());
        for (index, item_name, outcome) in finished {
            match outcome {
                Ok(outcome) => results.push(MapItem {
                    index,
                    name: item_name,
                    outcome,
                }),
                Err(e) if e.is_suspension() => {
                    if suspension.is_none() {
                        suspension = Some(e);
                    }
                }
                Err(e) => results.push(MapItem {
                    index,
                    name: item_name,
                    outcome: MapOutcome::Failed {
                        error: e.to_string(),
                    },
                }),
            }
        }
        if let Some(e) = suspension {
            return Err(e);
        }
        results.sort_by_key(|item| item.index);
        Ok(MapResult { items: results })
    }

    /// 挂起等待外部回调。
    ///
    /// 首次执行：登记 CallbackRecord、把 token 交给 `on_register`（通知外部审核方），返回 `Suspended`。
    /// 重放时根据回调记录状态返回 payload / `CallbackFailed` / `CallbackTimeout`，仍未决则再次 `Suspended`。
    pub async fn wait_for_callback<E, F, Fut>(
        &self,
        name: &str,
        on_register: F,
        options: WaitForCallbackOptions,
    ) -> Result<String, DurableError>
    where
        E: Display + Send,
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<(), E>> + Send,
    {
        let operation_id = self.next_operation_id(name);
        match self.load(&operation_id).await? {
            Some(Checkpoint::Waiting { token }) => {
                return self.poll_callback(&operation_id, &token).await
            }
            Some(Checkpoint::Resolved { token, state }) => {
                tracing::debug!(operation_id = %operation_id, "callback replayed from checkpoint");
                return callback_outcome(&token, state);
            }
            Some(Checkpoint::Succeeded { .. } | Checkpoint::Failed { .. }) => {
                return Err(DurableError::Store(format!(
                    "operation {operation_id} is not a callback"
                )))
            }
            None => {}
        }

        let timeout = options.timeout.or(self.shared.options.callback_timeout);
        let record = CallbackRecord::new(&self.shared.execution_id, &operation_id, name, timeout);
        let token = record.token.clone();
        self.shared.store.register_callback(&record).await?;

        let notified = on_register(token.clone()).await.map_err(|e| e.to_string());
        if let Err(message) = &notified {
            tracing::error!(operation_id = %operation_id, error = %message, "callback notifier failed");
            self.shared
                .store
                .resolve_callback(&token, CallbackResolution::Failure(message.clone()))
                .await?;
        }
        self.save(
            &operation_id,
            &Checkpoint::Waiting {
                token: token.clone(),
            },
        )
        .await?;

        match notified {
            Ok(()) => {
                tracing::info!(
                    execution_id = %self.shared.execution_id,
                    operation_id = %operation_id,
                    "awaiting external callback"
                );
                Err(DurableError::Suspended { token })
            }
            Err(message) => Err(DurableError::CallbackFailed { token, message }),
        }
    }

    /// 读取回调记录；首次观察到终态时写入 Resolved 检查点
    async fn poll_callback(&self, operation_id: &str, token: &str) -> Result<String, DurableError> {
        let store = &self.shared.store;
        let record = store
            .load_callback(token)
            .await?
            .ok_or_else(|| DurableError::UnknownCallback {
                token: token.to_string(),
            })?;
        let record = if record.is_pending() && record.is_expired() {
            tracing::warn!(token, "callback expired");
            store.expire_callback(token).await?
        } else {
            record
        };
        if !record.is_pending() {
            self.save(
                operation_id,
                &Checkpoint::Resolved {
                    token: token.to_string(),
                    state: record.state.clone(),
                },
            )
            .await?;
        }
        callback_outcome(token, record.state)
    }
}

fn callback_outcome(token: &str, state: CallbackState) -> Result<String, DurableError> {
    match state {
        CallbackState::Succeeded { payload } => Ok(payload),
        CallbackState::Failed { error } => Err(DurableError::CallbackFailed {
            token: token.to_string(),
            message: error,
        }),
        CallbackState::TimedOut => Err(DurableError::CallbackTimeout {
            token: token.to_string(),
        }),
        CallbackState::Pending => Err(DurableError::Suspended {
            token: token.to_string(),
        }),
    }
}
