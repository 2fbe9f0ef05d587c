use std::any::Any;

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::config::Disclosure;
use crate::error::{AppError, ErrorDetail, ErrorResponse};

/// 受限模式下返回给客户端的通用信息
pub const GENERIC_ERROR: &str = "Internal server error";

/// 记录所有 5xx 响应；受限模式下把响应体替换为通用信息
pub async fn log_errors(
    State(disclosure): State<Disclosure>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let response = next.run(req).await;

    if !response.status().is_server_error() {
        return response;
    }

    let detail = response.extensions().get::<ErrorDetail>().cloned();
    let (mut parts, body) = response.into_parts();

    match detail {
        Some(ErrorDetail(detail)) => {
            error!(
                "Server error occurred - {} {} Status: {}, Detail: {}",
                method, path, parts.status, detail
            );
            if disclosure == Disclosure::Verbose {
                return Response::from_parts(parts, body);
            }
        }
        None => {
            let bytes = match to_bytes(body, 1024).await {
                Ok(b) => b,
                Err(e) => {
                    error!("Failed to read error response body: {}", e);
                    return Response::from_parts(parts, Body::empty());
                }
            };
            error!(
                "Server error occurred - {} {} Status: {}, Body: {}",
                method,
                path,
                parts.status,
                String::from_utf8_lossy(&bytes)
            );
            if disclosure == Disclosure::Verbose {
                // 重置body以便重新构建响应
                parts.headers.remove(axum::http::header::CONTENT_LENGTH);
                return Response::from_parts(parts, Body::from(bytes));
            }
        }
    }

    (
        parts.status,
        Json(ErrorResponse {
            error: GENERIC_ERROR.to_string(),
        }),
    )
        .into_response()
}

/// 处理器 panic 时的响应，交给 log_errors 记录
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };

    AppError::Internal(detail).into_response()
}
