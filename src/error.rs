use std::time::Duration;

use axum::Json;
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 请求处理过程中可能出现的错误，每种对应一个 HTTP 状态码
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited { retry_after: Duration },
    #[error("Request body too large")]
    PayloadTooLarge,
    #[error("Upstream unavailable: {0}")]
    Upstream(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// 外部存储（数据库、Redis）调用失败
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Conflict(String),
    #[error("corrupt stored value: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// 5xx 响应附带的内部详情，由 log_errors 记录并按披露模式决定是否返回给客户端
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Upstream(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => AppError::Conflict(message),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        let mut response = (
            status,
            Json(ErrorResponse {
                error: message.clone(),
            }),
        )
            .into_response();

        if let AppError::RateLimited { retry_after } = &self {
            // 向上取整，至少 1 秒
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }

        if status.is_server_error() {
            response.extensions_mut().insert(ErrorDetail(message));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Upstream("db down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_conflict_maps_to_conflict() {
        let err: AppError = StoreError::Conflict("Email already exists".into()).into();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "Email already exists"));

        let err: AppError = StoreError::Timeout(Duration::from_secs(2)).into();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = AppError::RateLimited {
            retry_after: Duration::from_millis(1500),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
        assert!(response.extensions().get::<ErrorDetail>().is_none());
    }

    #[test]
    fn server_errors_carry_detail() {
        let response = AppError::Internal("boom".into()).into_response();
        let detail = response.extensions().get::<ErrorDetail>().unwrap();
        assert_eq!(detail.0, "Internal error: boom");
    }
}
