//! 持久化执行层：检查点 step、隔离子单元、并行 map、挂起等待回调，以及重放运行器

pub mod checkpoint;
pub mod context;
pub mod error;
pub mod file_store;
pub mod retry;
pub mod runner;
pub mod store;

pub use checkpoint::{
    CallbackRecord, CallbackResolution, CallbackState, Checkpoint, ExecutionRecord,
    ExecutionStatus,
};
pub use context::{
    ContextOptions, DurableContext, MapItem, MapOutcome, MapResult, WaitForCallbackOptions,
};
pub use error::{DurableError, Suspension};
pub use file_store::FileCheckpointStore;
pub use retry::RetryPolicy;
pub use runner::{DurableRunner, Execution, ExecutionOutcome, Workflow};
pub use store::{CheckpointStore, MemoryCheckpointStore};
