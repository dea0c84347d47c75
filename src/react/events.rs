//! 循环过程事件：供观察方（CLI / SSE）展示推理、工具派发与挂起
//!
//! 事件仅供参考，重放时可能重复发出。

use serde::Serialize;

use crate::core::LoopState;
use crate::llm::StopKind;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// 状态机迁移
    StateChanged { state: LoopState },
    /// 一次推理调用完成（含从检查点重放）
    InferenceCompleted { stop_kind: StopKind },
    /// 派发工具
    ToolDispatched { tool: String, id: String },
    /// 工具结果已收集
    ToolCompleted {
        tool: String,
        id: String,
        is_error: bool,
    },
    /// 等待外部回调
    Suspended { token: String },
    /// 最终回复
    Finished { text: String },
}
