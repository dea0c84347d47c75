//! 外部接入：执行与回调 HTTP 端点（feature = "server"）

#[cfg(feature = "server")]
pub mod http;
