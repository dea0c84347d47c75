//! 工具层：注册表、输入 schema、派发器与内置工具

pub mod dispatcher;
pub mod human_review;
pub mod registry;
pub mod schema;
pub mod weather;

pub use dispatcher::ToolDispatcher;
pub use human_review::{CallbackNotifier, LogNotifier, ReviewRequest, WaitForHumanReviewTool};
pub use registry::{Tool, ToolDescriptor, ToolRegistry};
pub use schema::input_schema_for;
pub use weather::{GetLocationTool, GetWeatherTool};
