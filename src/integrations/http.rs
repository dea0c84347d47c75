//! 执行与回调 HTTP 端点
//!
//! - POST /executions/:workflow        启动执行（body 为 JSON 输入）
//! - GET  /executions/:id              查询执行记录（与上一条共用路由，参数按方法解释）
//! - POST /executions/:id/resume       恢复执行
//! - POST /callbacks/:token/success    回调成功（body 为 payload 文本），随后恢复执行
//! - POST /callbacks/:token/failure    回调失败（body 为错误文本），随后恢复执行
//! - GET  /health

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::durable::{CallbackResolution, DurableError, DurableRunner, Execution, ExecutionRecord};

/// 服务状态
pub struct ServerState {
    pub runner: Arc<DurableRunner>,
}

type ApiError = (StatusCode, Json<Value>);

fn status_for(err: &DurableError) -> StatusCode {
    match err {
        DurableError::AlreadyResolved { .. } => StatusCode::CONFLICT,
        DurableError::NotResumable { .. } => StatusCode::CONFLICT,
        DurableError::UnknownCallback { .. }
        | DurableError::UnknownExecution { .. }
        | DurableError::UnknownWorkflow { .. } => StatusCode::NOT_FOUND,
        DurableError::CallbackTimeout { .. } => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: DurableError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (status, Json(json!({ "error": err.to_string() })))
}

pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/executions/:name", get(get_execution).post(start_execution))
        .route("/executions/:id/resume", post(resume_execution))
        .route("/callbacks/:token/success", post(callback_success))
        .route("/callbacks/:token/failure", post(callback_failure))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

async fn start_execution(
    State(state): State<Arc<ServerState>>,
    Path(workflow): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Json<Execution>, ApiError> {
    let input = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    state
        .runner
        .start(&workflow, input)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn get_execution(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionRecord>, ApiError> {
    match state.runner.execution(&id).await.map_err(api_error)? {
        Some(record) => Ok(Json(record)),
        None => Err(api_error(DurableError::UnknownExecution { id })),
    }
}

async fn resume_execution(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Execution>, ApiError> {
    state.runner.resume(&id).await.map(Json).map_err(api_error)
}

async fn callback_success(
    State(state): State<Arc<ServerState>>,
    Path(token): Path<String>,
    payload: String,
) -> Result<Json<Execution>, ApiError> {
    state
        .runner
        .signal_and_resume(&token, CallbackResolution::Success(payload))
        .await
        .map(Json)
        .map_err(api_error)
}

async fn callback_failure(
    State(state): State<Arc<ServerState>>,
    Path(token): Path<String>,
    error: String,
) -> Result<Json<Execution>, ApiError> {
    state
        .runner
        .signal_and_resume(&token, CallbackResolution::Failure(error))
        .await
        .map(Json)
        .map_err(api_error)
}
