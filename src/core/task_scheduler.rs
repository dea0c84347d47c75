//! 工具并发池：同一轮内并行派发的工具单元用 Semaphore 限制并发数

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 任务调度器
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    tool_semaphore: Arc<Semaphore>,
    max_concurrent_tools: usize,
}

impl TaskScheduler {
    pub fn new(max_concurrent_tools: usize) -> Self {
        let max_concurrent_tools = max_concurrent_tools.max(1);
        Self {
            tool_semaphore: Arc::new(Semaphore::new(max_concurrent_tools)),
            max_concurrent_tools,
        }
    }

    /// 获取工具执行许可；信号量从不关闭，None 仅在关闭后出现
    pub async fn acquire_tool(&self) -> Option<OwnedSemaphorePermit> {
        self.tool_semaphore.clone().acquire_owned().await.ok()
    }

    pub fn max_concurrent_tools(&self) -> usize {
        self.max_concurrent_tools
    }

    /// 当前空闲许可数
    pub fn available(&self) -> usize {
        self.tool_semaphore.available_permits()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_are_bounded() {
        let scheduler = TaskScheduler::new(2);
        let a = scheduler.acquire_tool().await;
        let _b = scheduler.acquire_tool().await;
        assert_eq!(scheduler.available(), 0);
        drop(a);
        assert_eq!(scheduler.available(), 1);
    }

    #[test]
    fn test_zero_is_clamped() {
        assert_eq!(TaskScheduler::new(0).max_concurrent_tools(), 1);
    }
}
