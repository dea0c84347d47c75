//! Agent 循环状态机
//!
//! AwaitingInference → {Terminal, DispatchingTools}；DispatchingTools → {AwaitingInference, Suspended}。
//! Suspended 在外部信号到达、执行被重放后回到 DispatchingTools。Terminal 是唯一接受状态。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 循环阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    AwaitingInference,
    DispatchingTools,
    Suspended,
    Terminal,
}

impl LoopState {
    /// 该迁移是否合法
    pub fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::*;
        matches!(
            (self, next),
            (AwaitingInference, Terminal)
                | (AwaitingInference, DispatchingTools)
                | (DispatchingTools, AwaitingInference)
                | (DispatchingTools, Suspended)
                | (Suspended, DispatchingTools)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == LoopState::Terminal
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::AwaitingInference => "awaiting_inference",
            LoopState::DispatchingTools => "dispatching_tools",
            LoopState::Suspended => "suspended",
            LoopState::Terminal => "terminal",
        };
        f.write_str(s)
    }
}
