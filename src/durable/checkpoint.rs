//! 检查点数据：操作记录、执行记录、回调（挂起）记录

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单个操作（step / child / callback）的持久化结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Checkpoint {
    Succeeded { value: Value },
    Failed { error: String },
    /// 已注册回调，尚未拿到外部信号
    Waiting { token: String },
    /// 回调已进入终态（成功 / 失败 / 超时），重放时不再读取回调记录
    Resolved { token: String, state: CallbackState },
}

/// 执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Suspended,
    Succeeded,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 一次工作流执行：恢复时据此重新运行处理函数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub workflow: String,
    pub input: Value,
    pub status: ExecutionStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    /// 创建时间（毫秒时间戳）
    pub created_at: i64,
    pub updated_at: i64,
}

impl ExecutionRecord {
    pub fn new(workflow: impl Into<String>, input: Value) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: format!("exec_{}", uuid::Uuid::new_v4()),
            workflow: workflow.into(),
            input,
            status: ExecutionStatus::Running,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_resumable(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Running | ExecutionStatus::Suspended
        )
    }
}

/// 回调状态：Pending 之外的任何状态都是终态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CallbackState {
    Pending,
    Succeeded { payload: String },
    Failed { error: String },
    TimedOut,
}

/// 外部信号的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResolution {
    Success(String),
    Failure(String),
}

/// 挂起记录：token 将外部信号关联回被挂起的操作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackRecord {
    pub token: String,
    pub execution_id: String,
    pub operation_id: String,
    pub name: String,
    pub state: CallbackState,
    pub created_at: i64,
    /// 截止时间（毫秒时间戳），None 表示不过期
    pub expires_at: Option<i64>,
}

impl CallbackRecord {
    pub fn new(
        execution_id: impl Into<String>,
        operation_id: impl Into<String>,
        name: impl Into<String>,
        timeout: Option<std::time::Duration>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            token: format!("cb_{}", uuid::Uuid::new_v4()),
            execution_id: execution_id.into(),
            operation_id: operation_id.into(),
            name: name.into(),
            state: CallbackState::Pending,
            created_at: now,
            expires_at: timeout.map(|t| now.saturating_add(t.as_millis() as i64)),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, CallbackState::Pending)
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|deadline| now_ms >= deadline)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_callback_expiry() {
        let record = CallbackRecord::new("exec", "op", "review", Some(Duration::from_secs(60)));
        assert!(record.is_pending());
        assert!(!record.is_expired_at(record.created_at));
        assert!(record.is_expired_at(record.created_at + 60_000));

        let forever = CallbackRecord::new("exec", "op", "review", None);
        assert!(!forever.is_expired_at(i64::MAX));
    }

    #[test]
    fn test_resolved_checkpoint_serde() {
        let cp = Checkpoint::Resolved {
            token: "cb_1".to_string(),
            state: CallbackState::TimedOut,
        };
        let json = serde_json::to_value(&cp).unwrap();
        assert_eq!(json["status"], "resolved");
        assert_eq!(json["state"]["state"], "timed_out");
        let back: Checkpoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, cp);
    }

    #[test]
    fn test_checkpoint_serde() {
        let cp = Checkpoint::Waiting {
            token: "cb_1".to_string(),
        };
        let json = serde_json::to_value(&cp).unwrap();
        assert_eq!(json["status"], "waiting");
        let back: Checkpoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, cp);
    }
}
