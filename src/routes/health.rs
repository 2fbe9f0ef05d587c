use axum::{
    extract::{Json, State},
    http::header,
    response::IntoResponse,
};
use serde::Serialize;

use crate::{AppState, error::AppError};

use super::user::handler::refresh_user_count;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub instance: String,
    pub service: String,
}

/// 存活检查，不访问任何后端
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        instance: state.config.instance_id.clone(),
        service: state.config.service_name.clone(),
    })
}

/// Prometheus 文本格式导出，导出前刷新用户数
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    refresh_user_count(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

pub async fn not_found() -> AppError {
    AppError::NotFound("Resource not found".to_string())
}
